//! Resource initialization
//!
//! Decides whether a resource can be served from the cache or which URLs the
//! downloader should try. The strategy is chosen once from the shape of the
//! requested version:
//!
//! | Request            | Strategy       |
//! |--------------------|----------------|
//! | (offline session)  | `Offline`      |
//! | none               | `Unversioned`  |
//! | `1.0`              | `ExactVersion` |
//! | `1.0+`, `1.0 2.0`  | `RangeVersion` |

pub mod urls;

use reqwest::Url;
use tracing::{debug, info, warn};

use crate::cache::CacheEntry;
use crate::context::FetchContext;
use crate::error::FetchError;
use crate::http::probe::UrlRequestResult;
use crate::resource::Resource;
use crate::version::{VersionId, VersionString};

use urls::{exact_candidates, prepend_https, range_candidates, unversioned_candidates};

#[derive(Debug, Clone, PartialEq)]
pub enum InitializationResult {
    /// The resource was served from the cache, or marked as failed
    NoDownloadNeeded,
    /// URLs to download from, best first
    Download(Vec<Url>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceInitializer {
    Unversioned,
    ExactVersion,
    RangeVersion,
    Offline,
}

impl ResourceInitializer {
    pub fn for_resource(resource: &Resource, context: &FetchContext) -> Self {
        if context.is_offline() {
            return ResourceInitializer::Offline;
        }

        match resource.request_version() {
            None => ResourceInitializer::Unversioned,
            Some(version) if version.exact_version_id().is_some() => {
                ResourceInitializer::ExactVersion
            }
            Some(_) => ResourceInitializer::RangeVersion,
        }
    }

    /// Serves the resource from the cache or returns the URLs to download.
    ///
    /// Network failures never surface as `Err`; only fatal probe errors and
    /// cache failures do.
    pub async fn init(
        self,
        resource: &Resource,
        context: &FetchContext,
    ) -> Result<InitializationResult, FetchError> {
        debug!("Initializing {} as {:?}", resource.location(), self);

        match (self, resource.request_version()) {
            (ResourceInitializer::Offline, _) => init_offline(resource, context),
            (ResourceInitializer::ExactVersion, Some(request)) => {
                init_exact(resource, context, request).await
            }
            (ResourceInitializer::RangeVersion, Some(request)) => {
                init_range(resource, context, request).await
            }
            _ => init_unversioned(resource, context).await,
        }
    }
}

fn serve_from_cache(
    context: &FetchContext,
    resource: &Resource,
    entry: CacheEntry,
) -> Result<InitializationResult, FetchError> {
    // Touch the entry so eviction sees it as used
    context
        .cache()
        .get_cache_file(&entry.location, entry.version.as_ref())?;

    info!(
        "Using cached {} ({}) at {}",
        resource.location(),
        entry
            .version
            .as_ref()
            .map_or("unversioned".to_string(), VersionId::to_string),
        entry.file.display()
    );
    resource.set_transferred(entry.size);
    resource.mark_downloaded(entry.file, entry.size);
    Ok(InitializationResult::NoDownloadNeeded)
}

fn download_from(resource: &Resource, best: UrlRequestResult) -> InitializationResult {
    resource.set_size(best.content_length());
    InitializationResult::Download(vec![best.url])
}

async fn init_unversioned(
    resource: &Resource,
    context: &FetchContext,
) -> Result<InitializationResult, FetchError> {
    let cache = context.cache();
    let location = resource.location();
    let force = resource.force_update_requested();
    let entry = cache.get_info(location, None)?;

    let needs_update = entry.as_ref().is_none_or(|entry| {
        force
            || resource
                .update_policy()
                .should_update(entry.downloaded_at, context.session_start())
    });
    if !needs_update && let Some(entry) = entry {
        return serve_from_cache(context, resource, entry);
    }

    let candidates = prepend_https(
        unversioned_candidates(location, resource.download_options()),
        context.network().https_dont_enforce,
    );

    match context.prober().find_best_url(location, &candidates).await {
        Ok(best) => {
            if let Some(entry) = entry {
                if !force && cache.is_up_to_date(location, None, best.last_modified())? {
                    return serve_from_cache(context, resource, entry);
                }
                info!("Cached copy of {} is outdated", location);
                cache.invalidate_existing_cache_file(location, None)?;
            }
            Ok(download_from(resource, best))
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => match entry {
            Some(entry) => {
                warn!("Could not check {} for updates: {}", location, e);
                serve_from_cache(context, resource, entry)
            }
            None => {
                warn!("Probing {} failed: {}; trying all candidates", location, e);
                Ok(InitializationResult::Download(candidates))
            }
        },
    }
}

async fn init_exact(
    resource: &Resource,
    context: &FetchContext,
    request: &VersionString,
) -> Result<InitializationResult, FetchError> {
    let cache = context.cache();
    let location = resource.location();
    let Some(version) = request.exact_version_id() else {
        return init_range(resource, context, request).await;
    };

    if let Some(entry) = cache.get_info(location, Some(version))? {
        if !resource.force_update_requested() {
            return serve_from_cache(context, resource, entry);
        }
        info!("Update of {} ({}) forced", location, version);
        cache.invalidate_existing_cache_file(location, Some(version))?;
    }

    // The newest older version lets the server answer with a jardiff
    let current = cache
        .get_all_versions_in_cache(location)?
        .into_iter()
        .filter(|cached| version.is_greater_than(cached))
        .max();

    let candidates = prepend_https(
        exact_candidates(
            location,
            request,
            resource.download_options(),
            current.as_ref(),
        ),
        context.network().https_dont_enforce,
    );

    match context.prober().find_best_url(location, &candidates).await {
        Ok(best) => Ok(download_from(resource, best)),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            warn!("Probing {} failed: {}; trying all candidates", location, e);
            Ok(InitializationResult::Download(candidates))
        }
    }
}

async fn init_range(
    resource: &Resource,
    context: &FetchContext,
    request: &VersionString,
) -> Result<InitializationResult, FetchError> {
    let cache = context.cache();
    let location = resource.location();
    let cached = cache.get_best_matching_version_in_cache(location, Some(request))?;

    let candidates = prepend_https(
        range_candidates(
            location,
            request,
            resource.download_options(),
            cached.as_ref(),
        ),
        context.network().https_dont_enforce,
    );

    match context.prober().find_best_url(location, &candidates).await {
        Ok(best) => {
            let remote = best.version().and_then(|v| VersionId::parse(v).ok());
            if let (Some(cached), Some(remote)) = (&cached, &remote)
                && cached.is_greater_or_equal(remote)
            {
                match cache.get_info(location, Some(cached))? {
                    Some(entry) if !resource.force_update_requested() => {
                        return serve_from_cache(context, resource, entry);
                    }
                    Some(_) => {
                        info!("Update of {} ({}) forced", location, cached);
                        cache.invalidate_existing_cache_file(location, Some(cached))?;
                    }
                    None => {}
                }
            }
            Ok(download_from(resource, best))
        }
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            if let Some(cached) = &cached
                && let Some(entry) = cache.get_info(location, Some(cached))?
            {
                warn!(
                    "Probing {} failed: {}; using cached version {}",
                    location, e, cached
                );
                return serve_from_cache(context, resource, entry);
            }
            warn!("Probing {} failed: {}; trying all candidates", location, e);
            Ok(InitializationResult::Download(candidates))
        }
    }
}

fn init_offline(
    resource: &Resource,
    context: &FetchContext,
) -> Result<InitializationResult, FetchError> {
    let cache = context.cache();
    let location = resource.location();

    let version = match resource.request_version() {
        None => None,
        Some(request) => cache.get_best_matching_version_in_cache(location, Some(request))?,
    };
    let entry = match (resource.request_version(), &version) {
        (Some(_), None) => None,
        _ => cache.get_info(location, version.as_ref())?,
    };

    match entry {
        Some(entry) => serve_from_cache(context, resource, entry),
        None => {
            warn!(
                "Offline and no cached version of {} matches {}",
                location,
                resource
                    .request_version()
                    .map_or("any version".to_string(), VersionString::to_string)
            );
            resource.mark_error();
            Ok(InitializationResult::NoDownloadNeeded)
        }
    }
}
