use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ConfigError;

// =============================================================================
// Network constants
// =============================================================================

/// Connect timeout for HEAD probes in milliseconds (5 seconds)
pub const HEAD_CONNECT_TIMEOUT_MS: u64 = 5_000;

/// Default number of redirects followed per candidate URL
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// How often a 511 answer is retried after a successful login
pub const MAX_AUTHENTICATION_ATTEMPTS: usize = 3;

/// Default number of probe and download tasks running at the same time
pub const DEFAULT_MAX_PARALLEL_DOWNLOADS: usize = 8;

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("versioned-fetch/", env!("CARGO_PKG_VERSION"));

/// Top-level configuration, read from a JSON file
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FetchConfig {
    pub cache: CacheConfig,
    pub network: NetworkConfig,
    /// Never touch the network; serve from cache only
    pub offline: bool,
}

/// Cache-related configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    /// Cache directory; defaults to [`cache_dir`]
    pub dir: Option<PathBuf>,
    /// Upper bound in bytes enforced by `clean`
    pub max_size: Option<u64>,
}

/// Network-related configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct NetworkConfig {
    pub connect_timeout_ms: u64,
    /// Follow 3xx answers while probing
    pub allow_redirect: bool,
    pub max_redirects: usize,
    /// Do not try `https` variants of `http` URLs first
    pub https_dont_enforce: bool,
    pub max_parallel_downloads: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: HEAD_CONNECT_TIMEOUT_MS,
            allow_redirect: false,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            https_dont_enforce: false,
            max_parallel_downloads: DEFAULT_MAX_PARALLEL_DOWNLOADS,
        }
    }
}

impl FetchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Configured cache directory, or the default one
    pub fn cache_dir(&self) -> PathBuf {
        self.cache.dir.clone().unwrap_or_else(cache_dir)
    }
}

/// Returns the path to the data directory for versioned-fetch.
/// Uses $XDG_DATA_HOME/versioned-fetch if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/versioned-fetch,
/// or ./versioned-fetch if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the default cache directory.
pub fn cache_dir() -> PathBuf {
    data_dir().join("cache")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("versioned-fetch.log")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("versioned-fetch")
}
