//! Resource download
//!
//! - [`ResourceDownloader`]: races GET requests over the candidate URLs and
//!   commits the winner to the cache
//! - [`unpack`]: transfer-encoding and content unpackers
//! - [`jardiff`]: incremental jar merging
//!
//! The body of the winning response is spooled to a temporary file while
//! the transferred byte count is updated, then unpacked on a blocking thread
//! straight into the cache.

pub mod jardiff;
pub mod unpack;

pub use unpack::{
    CompressionUnpacker, ContentUnpacker, CountingReader, Pack200Decoder,
    PassthroughPack200Decoder,
};

use std::io::{BufReader, Seek};
use std::sync::Arc;

use reqwest::{Response, Url};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cache::{DownloadInfo, ResourceCache};
use crate::context::FetchContext;
use crate::error::{CacheError, FetchError};
use crate::http::probe::{RequestMethod, UrlProber};
use crate::initializer::urls::is_versioned_file_url;
use crate::http::{CURRENT_VERSION_ID_PARAM, ERROR_MIME_TYPE, ResponseHeaders};
use crate::race::Winner;
use crate::resource::{Resource, ResourceStatus};
use crate::version::VersionId;

use unpack::query_param;

/// An accepted response whose body has not been read yet
struct Connection {
    response: Response,
    headers: ResponseHeaders,
    version: Option<VersionId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceDownloader {
    Unversioned,
    ExactVersion,
    RangeVersion,
}

impl ResourceDownloader {
    pub fn for_resource(resource: &Resource) -> Self {
        match resource.request_version() {
            None => ResourceDownloader::Unversioned,
            Some(version) if version.exact_version_id().is_some() => {
                ResourceDownloader::ExactVersion
            }
            Some(_) => ResourceDownloader::RangeVersion,
        }
    }

    /// Downloads `resource` from the first candidate that delivers it.
    ///
    /// Always leaves the resource `Downloaded` or `Error`; failures are
    /// logged, not returned.
    pub async fn download(
        self,
        resource: &Arc<Resource>,
        context: &FetchContext,
        candidates: &[Url],
    ) -> ResourceStatus {
        let location = resource.location();
        resource.mark_downloading();

        let mut remaining = candidates;
        let mut failures = Vec::new();

        while !remaining.is_empty() {
            let race = context
                .race()
                .run(remaining.iter().cloned().map(|url| {
                    let prober = context.prober().clone();
                    let resource = Arc::clone(resource);
                    move |_token: CancellationToken| async move {
                        self.connect(&prober, &resource, &url).await
                    }
                }))
                .await;

            match race {
                Ok(Winner { index, value }) => {
                    let version = value.version.clone();
                    let url = value.response.url().clone();
                    match self.transfer(resource, context, value).await {
                        Ok(()) => return resource.status(),
                        Err(e) => {
                            warn!("Downloading {} from {} failed: {}", location, url, e);
                            if let Err(e) = context
                                .cache()
                                .invalidate_existing_cache_file(location, version.as_ref())
                            {
                                warn!("Could not invalidate cache entry of {}: {}", location, e);
                            }
                            failures.push(e);
                            remaining = &remaining[index + 1..];
                        }
                    }
                }
                Err(e) => {
                    failures.extend(e.into_failures());
                    break;
                }
            }
        }

        let urls: Vec<&str> = candidates.iter().map(Url::as_str).collect();
        error!(
            "could not download resource {} from any of these urls {:?}{}",
            location,
            urls,
            failures
                .first()
                .map_or(String::new(), |e| format!(" caused by {}", e))
        );
        resource.mark_error();
        resource.status()
    }

    /// Sends the GET and decides whether the response is acceptable
    async fn connect(
        self,
        prober: &UrlProber,
        resource: &Resource,
        url: &Url,
    ) -> Result<Connection, FetchError> {
        debug!("Will download {} from {}", resource.location(), url);
        let response = prober.send(RequestMethod::Get, url).await?;
        let headers = ResponseHeaders::from_headers(response.headers());

        if headers
            .content_type
            .as_deref()
            .is_some_and(|t| t.starts_with(ERROR_MIME_TYPE))
        {
            let url = response.url().clone();
            let body = response.bytes().await?;
            return Err(FetchError::ServerError {
                url,
                message: String::from_utf8_lossy(&body).trim().to_string(),
            });
        }

        let version = self.determine_version(resource, response.url(), headers.version.as_deref())?;
        Ok(Connection {
            response,
            headers,
            version,
        })
    }

    /// The version the response actually delivers
    fn determine_version(
        self,
        resource: &Resource,
        url: &Url,
        header: Option<&str>,
    ) -> Result<Option<VersionId>, FetchError> {
        let mismatch = || FetchError::VersionMismatch {
            url: url.clone(),
            version: header.map(str::to_string),
        };
        let header_version = header.and_then(|h| VersionId::parse(h).ok());

        match self {
            ResourceDownloader::Unversioned => Ok(None),
            ResourceDownloader::ExactVersion => {
                let requested = resource
                    .request_version()
                    .and_then(|r| r.exact_version_id())
                    .ok_or_else(mismatch)?;

                // A version header overrides whatever the URL says
                let confirmed = match header {
                    Some(_) => header_version
                        .as_ref()
                        .is_some_and(|v| v.is_equal_to(requested)),
                    None => is_versioned_file_url(url, resource.location(), requested),
                };
                if confirmed {
                    Ok(Some(requested.clone()))
                } else {
                    Err(mismatch())
                }
            }
            ResourceDownloader::RangeVersion => header_version
                .filter(|v| resource.request_version().is_some_and(|r| r.contains(v)))
                .map(Some)
                .ok_or_else(mismatch),
        }
    }

    fn is_up_to_date(
        self,
        resource: &Resource,
        cache: &dyn ResourceCache,
        version: Option<&VersionId>,
        last_modified: Option<i64>,
    ) -> Result<bool, CacheError> {
        if resource.force_update_requested() {
            return Ok(false);
        }

        let location = resource.location();
        match self {
            ResourceDownloader::Unversioned => cache.is_up_to_date(location, None, last_modified),
            ResourceDownloader::ExactVersion | ResourceDownloader::RangeVersion => {
                cache.is_cached(location, version)
            }
        }
    }

    /// Reads the body of the winning response and commits it to the cache
    async fn transfer(
        self,
        resource: &Resource,
        context: &FetchContext,
        connection: Connection,
    ) -> Result<(), FetchError> {
        let Connection {
            mut response,
            headers,
            version,
        } = connection;
        let location = resource.location().clone();
        let url = response.url().clone();
        let cache = Arc::clone(context.cache());

        resource.set_size(headers.content_length);

        if self.is_up_to_date(resource, cache.as_ref(), version.as_ref(), headers.last_modified)?
            && let Some(entry) = cache.get_info(&location, version.as_ref())?
        {
            info!("{} is up to date, reusing {}", location, entry.file.display());
            resource.set_transferred(entry.size);
            resource.mark_downloaded(entry.file, entry.size);
            return Ok(());
        }

        let mut spool = tokio::fs::File::from_std(tempfile::tempfile()?);
        let mut read: u64 = 0;
        while let Some(chunk) = response.chunk().await? {
            spool.write_all(&chunk).await?;
            read += chunk.len() as u64;
            resource.set_transferred(read);
        }
        spool.flush().await?;

        if let Some(expected) = headers.content_length
            && expected > read
        {
            return Err(FetchError::IncompleteTransfer {
                url,
                read,
                expected,
            });
        }

        let compression = CompressionUnpacker::select(headers.content_encoding.as_deref(), &url);
        let content = ContentUnpacker::select(headers.content_type.as_deref(), &url);
        debug!(
            "Unpacking {} with {:?} and {:?}",
            url, compression, content
        );

        let base_jar = match content {
            ContentUnpacker::JarDiff => query_param(&url, CURRENT_VERSION_ID_PARAM)
                .and_then(|current| VersionId::parse(&current).ok())
                .map(|current| cache.get_cache_file(&location, Some(&current)))
                .transpose()?
                .flatten(),
            ContentUnpacker::Passthrough => None,
        };

        let info = DownloadInfo {
            location: location.clone(),
            version,
            last_modified: headers.last_modified,
        };
        let pack200 = Arc::clone(context.pack200());
        let mut spool = spool.into_std().await;
        spool.rewind()?;

        let (entry, raw_bytes) = tokio::task::spawn_blocking(move || {
            let mut counting = CountingReader::new(BufReader::new(spool));
            let entry = {
                let unpacked = compression.unpack(&mut counting, pack200.as_ref())?;
                let mut unpacked = content.unpack(unpacked, base_jar.as_deref())?;
                cache.add_to_cache(&info, &mut unpacked)?
            };
            Ok::<_, FetchError>((entry, counting.count()))
        })
        .await??;

        info!(
            "Downloaded {} from {} into {}",
            location,
            url,
            entry.file.display()
        );
        resource.set_transferred(raw_bytes);
        resource.mark_downloaded(entry.file, entry.size);
        Ok(())
    }
}
