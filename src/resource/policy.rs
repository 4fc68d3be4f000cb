/// When a cached copy must be checked against the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdatePolicy {
    /// Check on every request
    #[default]
    Always,
    /// Check once per session
    Session,
    /// Never check if a cached copy exists
    Never,
    /// Discard the cached copy and download again
    Force,
}

impl UpdatePolicy {
    /// Decides whether an entry downloaded at `downloaded_at` (ms since the
    /// UNIX epoch) needs an update check in a session started at
    /// `session_start`
    pub fn should_update(self, downloaded_at: i64, session_start: i64) -> bool {
        match self {
            UpdatePolicy::Always | UpdatePolicy::Force => true,
            UpdatePolicy::Never => false,
            UpdatePolicy::Session => downloaded_at < session_start,
        }
    }
}

/// Which versioned-download protocol variants may be requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DownloadOptions {
    /// Try `.pack.gz` variants first
    pub use_pack: bool,
    /// Try `name__V<version>.ext` file names
    pub use_version: bool,
}

impl DownloadOptions {
    pub const NONE: DownloadOptions = DownloadOptions {
        use_pack: false,
        use_version: false,
    };

    pub fn new(use_pack: bool, use_version: bool) -> Self {
        Self {
            use_pack,
            use_version,
        }
    }
}
