//! Persistent resource cache keyed by (location, version)
//!
//! - [`ResourceCache`]: the operations the initializers and downloaders need
//! - [`disk`]: SQLite-indexed implementation storing one file per entry

pub mod disk;

pub use disk::DiskCache;

use std::io::Read;
use std::path::PathBuf;

use reqwest::Url;

use crate::error::CacheError;
use crate::version::{VersionId, VersionString};

/// What is known about a download when it is committed to the cache
#[derive(Debug, Clone, PartialEq)]
pub struct DownloadInfo {
    pub location: Url,
    pub version: Option<VersionId>,
    /// Server `Last-Modified` in ms since the UNIX epoch
    pub last_modified: Option<i64>,
}

/// A committed cache entry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub location: Url,
    pub version: Option<VersionId>,
    pub file: PathBuf,
    pub last_modified: Option<i64>,
    pub downloaded_at: i64,
    pub size: u64,
}

/// Storage contract used by the acquisition pipeline.
///
/// `version == None` addresses the unversioned entry of a location.
/// Implementations must make [`add_to_cache`](Self::add_to_cache) atomic with
/// respect to readers: a reader sees the previous file or the complete new one.
pub trait ResourceCache: Send + Sync {
    fn is_cached(&self, location: &Url, version: Option<&VersionId>) -> Result<bool, CacheError>;

    /// True if any cached version of `location` is contained in `version_string`,
    /// or if the unversioned entry exists when no version string is given
    fn is_any_cached(
        &self,
        location: &Url,
        version_string: Option<&VersionString>,
    ) -> Result<bool, CacheError>;

    /// True if the entry exists and is not older than `last_modified`.
    /// An unknown remote timestamp counts as up to date.
    fn is_up_to_date(
        &self,
        location: &Url,
        version: Option<&VersionId>,
        last_modified: Option<i64>,
    ) -> Result<bool, CacheError>;

    fn get_info(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<Option<CacheEntry>, CacheError>;

    /// Most preferred cached version according to `VersionIdComparator`
    fn get_best_matching_version_in_cache(
        &self,
        location: &Url,
        version_string: Option<&VersionString>,
    ) -> Result<Option<VersionId>, CacheError>;

    /// All cached versions of `location`, lowest first
    fn get_all_versions_in_cache(&self, location: &Url) -> Result<Vec<VersionId>, CacheError>;

    fn get_cache_file(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<Option<PathBuf>, CacheError>;

    /// Path the entry is stored at, creating its directory if needed
    fn get_or_create_cache_file(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<PathBuf, CacheError>;

    fn add_to_cache(
        &self,
        info: &DownloadInfo,
        content: &mut dyn Read,
    ) -> Result<CacheEntry, CacheError>;

    /// Removes the entry and its file
    fn invalidate_existing_cache_file(
        &self,
        location: &Url,
        version: Option<&VersionId>,
    ) -> Result<(), CacheError>;

    /// Removes every entry of `location` contained in `version_string`, or all
    /// of them when none is given. Returns the number of removed entries.
    fn delete_from_cache(
        &self,
        location: &Url,
        version_string: Option<&VersionString>,
    ) -> Result<usize, CacheError>;

    fn clear_cache(&self) -> Result<(), CacheError>;

    /// Evicts least recently used entries until the cache fits `max_size`
    /// bytes. Returns the number of freed bytes.
    fn clean_cache(&self, max_size: u64) -> Result<u64, CacheError>;
}
