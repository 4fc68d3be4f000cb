//! Cache and context builders

use std::io::{Cursor, Write};
use std::sync::Arc;

use flate2::Compression;
use flate2::write::GzEncoder;
use reqwest::Url;
use tempfile::TempDir;
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use versioned_fetch::cache::{DiskCache, DownloadInfo, ResourceCache};
use versioned_fetch::config::FetchConfig;
use versioned_fetch::resource::{DownloadOptions, UpdatePolicy};
use versioned_fetch::version::VersionId;
use versioned_fetch::{FetchContext, ResourceTracker};

/// Creates an empty cache in a temporary directory.
/// The directory lives as long as the returned `TempDir`.
pub fn create_test_cache() -> (TempDir, Arc<DiskCache>) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let cache = Arc::new(DiskCache::new(dir.path()).expect("Failed to create cache"));
    (dir, cache)
}

pub fn seed_cache(cache: &DiskCache, location: &Url, version: Option<&str>, content: &[u8]) {
    let info = DownloadInfo {
        location: location.clone(),
        version: version.map(|v| VersionId::parse(v).expect("Invalid version")),
        last_modified: None,
    };
    cache
        .add_to_cache(&info, &mut Cursor::new(content.to_vec()))
        .expect("Failed to seed cache");
}

pub fn create_test_context(cache: Arc<DiskCache>, config: &FetchConfig) -> Arc<FetchContext> {
    Arc::new(FetchContext::new(cache, config).expect("Failed to create context"))
}

pub fn create_test_tracker(
    context: Arc<FetchContext>,
    options: DownloadOptions,
) -> ResourceTracker {
    ResourceTracker::new(context, false, options, UpdatePolicy::Always)
}

pub fn server_url(server: &mockito::Server, path: &str) -> Url {
    Url::parse(&format!("{}{}", server.url(), path)).expect("Invalid URL")
}

/// A jar with the given entries
pub fn jar(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, content) in entries {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .expect("Failed to start entry");
        writer
            .write_all(content.as_bytes())
            .expect("Failed to write entry");
    }
    writer.finish().expect("Failed to finish jar").into_inner()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("Failed to compress");
    encoder.finish().expect("Failed to compress")
}
