//! Shared setup for the end-to-end tests

#![allow(dead_code)]

mod cache;

pub use cache::*;
