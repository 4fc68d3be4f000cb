use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version-id: {0:?}")]
    InvalidVersionId(String),

    #[error("Invalid version-range: {0:?}")]
    InvalidVersionRange(String),

    #[error("Invalid version-string: {0:?}")]
    InvalidVersionString(String),
}
