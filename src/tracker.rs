//! Resource tracking
//!
//! [`ResourceTracker`] registers resources by location and drives each one
//! through initialization and download exactly once. Callers asking for a
//! resource that is already being processed wait for that outcome instead of
//! starting a second download.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use reqwest::Url;
use tracing::{debug, error, warn};

use crate::context::FetchContext;
use crate::downloader::ResourceDownloader;
use crate::error::FetchError;
use crate::initializer::{InitializationResult, ResourceInitializer};
use crate::resource::{DownloadOptions, Resource, ResourceStatus, UpdatePolicy};
use crate::version::VersionString;

/// Drops the fragment; scheme and host are already lower-cased by the parser
pub fn normalize_url(location: &Url) -> Url {
    let mut url = location.clone();
    url.set_fragment(None);
    url
}

pub struct ResourceTracker {
    context: Arc<FetchContext>,
    prefetch: bool,
    options: DownloadOptions,
    policy: UpdatePolicy,
    resources: Mutex<HashMap<Url, Arc<Resource>>>,
}

impl ResourceTracker {
    pub fn new(
        context: Arc<FetchContext>,
        prefetch: bool,
        options: DownloadOptions,
        policy: UpdatePolicy,
    ) -> Self {
        Self {
            context,
            prefetch,
            options,
            policy,
            resources: Mutex::new(HashMap::new()),
        }
    }

    fn lock_resources(&self) -> MutexGuard<'_, HashMap<Url, Arc<Resource>>> {
        self.resources.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a resource. Adding a known location again with the same
    /// version returns the tracked resource.
    ///
    /// With prefetching enabled the download starts right away on the
    /// current Tokio runtime.
    pub fn add_resource(
        &self,
        location: &Url,
        version: Option<VersionString>,
    ) -> Result<Arc<Resource>, FetchError> {
        let location = normalize_url(location);
        let resource = {
            let mut resources = self.lock_resources();
            if let Some(existing) = resources.get(&location) {
                if existing.request_version() != version.as_ref() {
                    return Err(FetchError::ConflictingVersions {
                        location,
                        requested: version.map(|v| v.to_string()),
                        existing: existing.request_version().map(VersionString::to_string),
                    });
                }
                return Ok(Arc::clone(existing));
            }

            let resource = Arc::new(Resource::new(
                location.clone(),
                version,
                self.options,
                self.policy,
            ));
            resources.insert(location, Arc::clone(&resource));
            resource
        };

        if self.prefetch {
            self.start(&resource);
        }
        Ok(resource)
    }

    /// The tracked resource at `location`
    pub fn resource(&self, location: &Url) -> Result<Arc<Resource>, FetchError> {
        let location = normalize_url(location);
        self.lock_resources()
            .get(&location)
            .cloned()
            .ok_or(FetchError::NotTracked(location))
    }

    /// Starts processing in the background unless already done or running
    fn start(&self, resource: &Arc<Resource>) {
        if resource.is_complete() || resource.is_being_processed() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let context = Arc::clone(&self.context);
                let resource = Arc::clone(resource);
                handle.spawn(async move {
                    Self::put_into_cache(&context, &resource).await;
                });
            }
            Err(_) => warn!(
                "No runtime to prefetch {}; it will be fetched on first use",
                resource.location()
            ),
        }
    }

    /// Initializes and downloads `resource` unless it already completed.
    ///
    /// Only one caller processes a resource at a time; concurrent callers
    /// wait for its outcome. The resource always ends `Downloaded` or
    /// `Error`.
    pub async fn put_into_cache(context: &FetchContext, resource: &Arc<Resource>) -> ResourceStatus {
        if resource.is_complete() {
            return resource.status();
        }
        if !resource.try_claim() {
            debug!("{} is already being processed", resource.location());
            return resource.wait_for_completion().await;
        }
        if resource.is_complete() {
            resource.release();
            return resource.status();
        }

        let initializer = ResourceInitializer::for_resource(resource, context);
        match initializer.init(resource, context).await {
            Ok(InitializationResult::NoDownloadNeeded) => {}
            Ok(InitializationResult::Download(candidates)) => {
                ResourceDownloader::for_resource(resource)
                    .download(resource, context, &candidates)
                    .await;
            }
            Err(e) => {
                error!("Initializing {} failed: {}", resource.location(), e);
                resource.mark_error();
            }
        }

        if !resource.is_complete() {
            resource.mark_error();
        }
        resource.release();
        resource.status()
    }

    /// Local copy of the resource, downloading it first if needed.
    /// `None` if the resource could not be acquired.
    pub async fn get_cache_file(&self, location: &Url) -> Result<Option<PathBuf>, FetchError> {
        let resource = self.resource(location)?;

        Ok(match Self::put_into_cache(&self.context, &resource).await {
            ResourceStatus::Downloaded => resource.local_file(),
            _ => None,
        })
    }

    /// Gives a failed resource another attempt
    pub async fn retry(&self, location: &Url) -> Result<ResourceStatus, FetchError> {
        let resource = self.resource(location)?;
        if resource.status() == ResourceStatus::Error {
            resource.reset_for_retry();
        }
        Ok(Self::put_into_cache(&self.context, &resource).await)
    }

    /// Starts every resource and waits for all of them to complete.
    /// Returns `false` if `timeout` elapsed first; the downloads go on.
    pub async fn wait_for_resources(
        &self,
        locations: &[Url],
        timeout: Duration,
    ) -> Result<bool, FetchError> {
        let resources = locations
            .iter()
            .map(|location| self.resource(location))
            .collect::<Result<Vec<_>, _>>()?;

        for resource in &resources {
            self.start(resource);
        }

        let completion = join_all(resources.iter().map(|r| r.wait_for_completion()));
        Ok(tokio::time::timeout(timeout, completion).await.is_ok())
    }

    /// Bytes transferred so far
    pub fn get_amount_read(&self, location: &Url) -> Result<u64, FetchError> {
        Ok(self.resource(location)?.transferred())
    }

    /// Total size in bytes, `None` while unknown
    pub fn get_total_size(&self, location: &Url) -> Result<Option<u64>, FetchError> {
        Ok(self.resource(location)?.size())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    use crate::cache::DiskCache;
    use crate::config::FetchConfig;

    fn tracker(dir: &TempDir, config: &FetchConfig, prefetch: bool) -> ResourceTracker {
        let cache = Arc::new(DiskCache::new(dir.path()).unwrap());
        let context = Arc::new(FetchContext::new(cache, config).unwrap());
        ResourceTracker::new(context, prefetch, DownloadOptions::NONE, UpdatePolicy::Always)
    }

    fn url(server: &mockito::Server, path: &str) -> Url {
        Url::parse(&format!("{}{}", server.url(), path)).unwrap()
    }

    fn vs(s: &str) -> Option<VersionString> {
        Some(VersionString::parse(s).unwrap())
    }

    #[test]
    fn add_resource_twice_returns_same_resource() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir, &FetchConfig::default(), false);
        let location = Url::parse("http://example.com/app.jar").unwrap();

        let first = tracker.add_resource(&location, vs("1.0")).unwrap();
        let second = tracker
            .add_resource(&Url::parse("HTTP://Example.COM/app.jar#main").unwrap(), vs("1.0"))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn add_resource_with_other_version_conflicts() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir, &FetchConfig::default(), false);
        let location = Url::parse("http://example.com/app.jar").unwrap();
        tracker.add_resource(&location, vs("1.0")).unwrap();

        let result = tracker.add_resource(&location, vs("2.0"));

        match result {
            Err(FetchError::ConflictingVersions {
                requested, existing, ..
            }) => {
                assert_eq!(requested.as_deref(), Some("2.0"));
                assert_eq!(existing.as_deref(), Some("1.0"));
            }
            other => panic!("unexpected result: {:?}", other.map(|r| r.location().clone())),
        }
    }

    #[test]
    fn untracked_location_is_reported() {
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir, &FetchConfig::default(), false);
        let location = Url::parse("http://example.com/app.jar").unwrap();

        assert!(matches!(
            tracker.get_amount_read(&location),
            Err(FetchError::NotTracked(_))
        ));
        assert!(matches!(
            tracker.get_total_size(&location),
            Err(FetchError::NotTracked(_))
        ));
    }

    #[tokio::test]
    async fn concurrent_requests_download_once() {
        let mut server = mockito::Server::new_async().await;
        let head = server
            .mock("HEAD", "/app.jar")
            .with_status(200)
            .expect(1)
            .create_async()
            .await;
        let get = server
            .mock("GET", "/app.jar")
            .with_status(200)
            .with_body("content")
            .expect(1)
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir, &FetchConfig::default(), false);
        let location = url(&server, "/app.jar");
        tracker.add_resource(&location, None).unwrap();

        let (first, second) = tokio::join!(
            tracker.get_cache_file(&location),
            tracker.get_cache_file(&location)
        );

        let first = first.unwrap().unwrap();
        assert_eq!(second.unwrap(), Some(first.clone()));
        assert_eq!(std::fs::read(first).unwrap(), b"content");
        assert_eq!(tracker.get_amount_read(&location).unwrap(), 7);
        assert_eq!(tracker.get_total_size(&location).unwrap(), Some(7));
        head.assert_async().await;
        get.assert_async().await;
    }

    #[tokio::test]
    async fn prefetched_resources_complete_within_timeout() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/app.jar")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("GET", "/app.jar")
            .with_status(200)
            .with_body("content")
            .create_async()
            .await;
        let dir = TempDir::new().unwrap();
        let tracker = tracker(&dir, &FetchConfig::default(), true);
        let location = url(&server, "/app.jar");
        let resource = tracker.add_resource(&location, None).unwrap();

        let completed = tracker
            .wait_for_resources(std::slice::from_ref(&location), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(completed);
        assert_eq!(resource.status(), ResourceStatus::Downloaded);
    }

    #[tokio::test]
    async fn offline_miss_yields_no_file_and_can_be_retried() {
        let dir = TempDir::new().unwrap();
        let config = FetchConfig {
            offline: true,
            ..FetchConfig::default()
        };
        let tracker = tracker(&dir, &config, false);
        let location = Url::parse("http://127.0.0.1:1/app.jar").unwrap();
        let resource = tracker.add_resource(&location, vs("1.0")).unwrap();

        assert_eq!(tracker.get_cache_file(&location).await.unwrap(), None);
        assert_eq!(resource.status(), ResourceStatus::Error);
        assert!(!resource.is_being_processed());

        let status = tracker.retry(&location).await.unwrap();

        assert_eq!(status, ResourceStatus::Error);
    }
}
