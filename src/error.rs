use reqwest::{StatusCode, Url};
use thiserror::Error;

use crate::version::VersionError;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to acquire database lock")]
    LockPoisoned,

    #[error("Invalid version in cache index: {0}")]
    InvalidVersion(#[from] VersionError),

    #[error("Invalid location in cache index: {0}")]
    InvalidLocation(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Unexpected status {status} from {url}")]
    Status { url: Url, status: StatusCode },

    #[error("Server error from {url}: {message}")]
    ServerError { url: Url, message: String },

    #[error("Redirect from {url} to {location} is not allowed")]
    RedirectNotAllowed { url: Url, location: String },

    #[error("Redirect from {0} has no usable Location header")]
    MissingRedirectLocation(Url),

    #[error("Too many redirects starting at {0}")]
    TooManyRedirects(Url),

    #[error("Authentication for {0} was declined")]
    AuthenticationDeclined(Url),

    #[error("Could not determine the version-id from the response of {url} -> {version:?}")]
    VersionMismatch { url: Url, version: Option<String> },

    #[error("Did read {read} bytes from {url} but expected {expected}")]
    IncompleteTransfer { url: Url, read: u64, expected: u64 },

    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Invalid jardiff: {0}")]
    JarDiff(String),

    #[error("Could not reach {0} from any candidate URL")]
    CandidateExhausted(Url),

    #[error("Task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Found two resources with location {location} but different versions {requested:?} - {existing:?}")]
    ConflictingVersions {
        location: Url,
        requested: Option<String>,
        existing: Option<String>,
    },

    #[error("Resource is not tracked: {0}")]
    NotTracked(Url),
}

impl FetchError {
    /// Errors that abort a whole probe instead of only failing one candidate
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FetchError::AuthenticationDeclined(_) | FetchError::RedirectNotAllowed { .. }
        )
    }
}
