//! Version algebra for versioned resource requests
//!
//! Implements the JNLP version grammar: exact version ids, modifier-carrying
//! simple ranges (`1.2*`, `1.2+`), `&`-joined compound ranges and
//! space-separated version strings.
//!
//! # Grammar
//!
//! ```text
//! version-string ::= version-range (" " version-range)*
//! version-range  ::= simple-range ("&" simple-range)*
//! simple-range   ::= version-id modifier?
//! modifier       ::= "+" | "*"
//! version-id     ::= string (separator string)*
//! separator      ::= "." | "-" | "_"
//! ```
//!
//! # Modules
//!
//! - [`id`]: `VersionId` parsing and element-wise comparison
//! - [`range`]: `SimpleRange` and `VersionRange` match predicates
//! - [`string`]: `VersionString` and the cache-ranking `VersionIdComparator`
//! - [`error`]: Parse errors

pub mod error;
pub mod id;
pub mod range;
pub mod string;

pub use error::VersionError;
pub use id::{Modifier, VersionId};
pub use range::{SimpleRange, VersionRange};
pub use string::{VersionIdComparator, VersionString};
