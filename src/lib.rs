//! Versioned resource acquisition and caching
//!
//! Fetches network-hosted artifacts identified by a URL and an optional
//! version request, serving them from a local cache whenever it satisfies
//! the request:
//!
//! ```text
//! ResourceTracker ─▶ ResourceInitializer ─▶ cache hit ─▶ done
//!                           │
//!                     candidate URLs
//!                           ▼
//!                   ResourceDownloader ─▶ ResourceCache
//! ```
//!
//! - [`version`]: version ids, ranges and version strings
//! - [`race`]: prioritized parallel execution of candidate tasks
//! - [`resource`]: resources and their status
//! - [`cache`]: the cache contract and the on-disk implementation
//! - [`http`]: protocol constants and URL probing
//! - [`initializer`]: cache-or-download decisions and candidate URLs
//! - [`downloader`]: transfer, unpacking and cache commit
//! - [`tracker`]: resource registration and orchestration

pub mod cache;
pub mod config;
pub mod context;
pub mod downloader;
pub mod error;
pub mod http;
pub mod initializer;
pub mod logging;
pub mod race;
pub mod resource;
pub mod tracker;
pub mod version;

pub use context::FetchContext;
pub use error::{CacheError, ConfigError, FetchError};
pub use tracker::ResourceTracker;
