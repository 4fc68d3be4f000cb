//! HTTP side of the versioned download protocol
//!
//! - [`probe`]: HEAD probing of candidate URLs (redirects, 511 challenges)
//!
//! Requests advertise `Accept-Encoding: pack200-gzip, gzip`; responses may
//! carry the authoritative version in `x-java-jnlp-version-id`.

pub mod probe;

use std::time::Duration;

use reqwest::header::{
    CONTENT_ENCODING, CONTENT_LENGTH, CONTENT_TYPE, HeaderMap, LAST_MODIFIED,
};
use reqwest::redirect::Policy;

use crate::config::{NetworkConfig, USER_AGENT};
use crate::error::FetchError;

/// Response header naming the version the server delivered
pub const VERSION_ID_HEADER: &str = "x-java-jnlp-version-id";

/// Value of the `Accept-Encoding` request header
pub const ACCEPT_ENCODING_VALUE: &str = "pack200-gzip, gzip";

pub const PACK200_GZIP_ENCODING: &str = "pack200-gzip";
pub const GZIP_ENCODING: &str = "gzip";

/// Content type of incremental jar updates
pub const JARDIFF_MIME_TYPE: &str = "application/x-java-archive-diff";

/// Content type the server uses to report a failed versioned request
pub const ERROR_MIME_TYPE: &str = "application/x-java-jnlp-error";

pub const VERSION_ID_PARAM: &str = "version-id";
pub const CURRENT_VERSION_ID_PARAM: &str = "current-version-id";

/// Builds the client used for probing and downloading.
///
/// Redirects are not followed automatically so the prober can enforce the
/// configured allowance, and no transparent decompression is enabled so the
/// unpackers see the raw wire bytes.
pub fn build_client(config: &NetworkConfig) -> Result<reqwest::Client, FetchError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .redirect(Policy::none())
        .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
        .build()?)
}

/// Response headers relevant to caching and unpacking
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHeaders {
    /// Raw `x-java-jnlp-version-id`
    pub version: Option<String>,
    /// `Last-Modified` in ms since the UNIX epoch
    pub last_modified: Option<i64>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub content_encoding: Option<String>,
}

impl ResponseHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let text = |name| {
            headers
                .get(name)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        Self {
            version: text(VERSION_ID_HEADER),
            last_modified: text(LAST_MODIFIED.as_str()).and_then(|value| parse_http_date(&value)),
            content_length: text(CONTENT_LENGTH.as_str()).and_then(|value| value.parse().ok()),
            content_type: text(CONTENT_TYPE.as_str()),
            content_encoding: text(CONTENT_ENCODING.as_str()),
        }
    }
}

/// Parses an RFC 7231 date such as `Wed, 21 Oct 2015 07:28:00 GMT` into ms
/// since the UNIX epoch
pub fn parse_http_date(value: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|date| date.timestamp_millis())
}
