//! Candidate URL probing
//!
//! [`UrlProber`] sends requests the way the versioned download protocol
//! expects: redirects are followed by hand within the configured allowance
//! and a `511 Network Authentication Required` answer is handed to an
//! [`AuthenticationHook`] before the same URL is tried again.

use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use reqwest::header::{ACCEPT_ENCODING, LOCATION};
use reqwest::{Client, Method, Response, StatusCode, Url};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{MAX_AUTHENTICATION_ATTEMPTS, NetworkConfig};
use crate::error::FetchError;
use crate::http::{ACCEPT_ENCODING_VALUE, ResponseHeaders};
use crate::race::{PrioritizedRace, RaceError};

/// Login callback for servers answering `511`
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait AuthenticationHook: Send + Sync {
    /// Gives the user a chance to log in after `url` answered `511`.
    /// Returns `true` if the request should be retried.
    async fn authenticate(&self, url: &Url) -> bool;
}

/// Hook used when no interactive login is available
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclineAuthentication;

#[async_trait::async_trait]
impl AuthenticationHook for DeclineAuthentication {
    async fn authenticate(&self, url: &Url) -> bool {
        warn!("Authentication required for {} but no login is available", url);
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Head,
    Get,
}

impl From<RequestMethod> for Method {
    fn from(method: RequestMethod) -> Self {
        match method {
            RequestMethod::Head => Method::HEAD,
            RequestMethod::Get => Method::GET,
        }
    }
}

impl fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestMethod::Head => f.write_str("HEAD"),
            RequestMethod::Get => f.write_str("GET"),
        }
    }
}

/// Outcome of a successful probe
#[derive(Debug, Clone, PartialEq)]
pub struct UrlRequestResult {
    /// URL that finally answered, after redirects
    pub url: Url,
    pub status: StatusCode,
    pub headers: ResponseHeaders,
}

impl UrlRequestResult {
    pub fn version(&self) -> Option<&str> {
        self.headers.version.as_deref()
    }

    pub fn last_modified(&self) -> Option<i64> {
        self.headers.last_modified
    }

    pub fn content_length(&self) -> Option<u64> {
        self.headers.content_length
    }
}

fn is_followed_redirect(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::MOVED_PERMANENTLY
            | StatusCode::FOUND
            | StatusCode::SEE_OTHER
            | StatusCode::TEMPORARY_REDIRECT
            | StatusCode::PERMANENT_REDIRECT
    )
}

/// Sends protocol requests and picks the best of several candidate URLs
#[derive(Clone)]
pub struct UrlProber {
    client: Client,
    network: NetworkConfig,
    auth: Arc<dyn AuthenticationHook>,
    race: PrioritizedRace,
}

impl UrlProber {
    pub fn new(
        client: Client,
        network: NetworkConfig,
        auth: Arc<dyn AuthenticationHook>,
        race: PrioritizedRace,
    ) -> Self {
        Self {
            client,
            network,
            auth,
            race,
        }
    }

    /// Sends `method` to `url` and returns the first successful response.
    ///
    /// Fails with a per-candidate error on transport problems or non-2xx
    /// answers, and with a fatal error when a redirect is not allowed or the
    /// authentication hook declines.
    pub async fn send(&self, method: RequestMethod, url: &Url) -> Result<Response, FetchError> {
        let mut current = url.clone();
        let mut redirects = 0;
        let mut authentication_attempts = 0;

        loop {
            debug!("{} {}", method, current);
            let response = self
                .client
                .request(method.into(), current.clone())
                .header(ACCEPT_ENCODING, ACCEPT_ENCODING_VALUE)
                .send()
                .await?;
            let status = response.status();

            if is_followed_redirect(status) {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| current.join(value).ok())
                    .ok_or_else(|| FetchError::MissingRedirectLocation(current.clone()))?;

                if !self.network.allow_redirect {
                    return Err(FetchError::RedirectNotAllowed {
                        url: current,
                        location: location.to_string(),
                    });
                }

                redirects += 1;
                if redirects > self.network.max_redirects {
                    return Err(FetchError::TooManyRedirects(url.clone()));
                }

                debug!("Following redirect from {} to {}", current, location);
                current = location;
                continue;
            }

            if status == StatusCode::NETWORK_AUTHENTICATION_REQUIRED {
                authentication_attempts += 1;
                if authentication_attempts > MAX_AUTHENTICATION_ATTEMPTS {
                    return Err(FetchError::Status {
                        url: current,
                        status,
                    });
                }
                if !self.auth.authenticate(&current).await {
                    return Err(FetchError::AuthenticationDeclined(current));
                }
                debug!("Retrying {} after authentication", current);
                continue;
            }

            if !status.is_success() {
                debug!("{} {} answered {}", method, current, status);
                return Err(FetchError::Status {
                    url: current,
                    status,
                });
            }

            return Ok(response);
        }
    }

    /// Probes a single URL, discarding any body
    pub async fn probe(
        &self,
        method: RequestMethod,
        url: &Url,
    ) -> Result<UrlRequestResult, FetchError> {
        let response = self.send(method, url).await?;

        Ok(UrlRequestResult {
            url: response.url().clone(),
            status: response.status(),
            headers: ResponseHeaders::from_headers(response.headers()),
        })
    }

    /// Finds the highest-priority candidate that answers successfully.
    ///
    /// HEAD requests are raced first; servers that refuse HEAD get a second
    /// round with GET. A fatal failure (refused redirect, declined login)
    /// only aborts the lookup when no candidate of that round succeeds; a
    /// fatal failure overtaken by a lower-priority success is logged and
    /// dropped. Otherwise failing rounds end in
    /// [`FetchError::CandidateExhausted`].
    pub async fn find_best_url(
        &self,
        location: &Url,
        candidates: &[Url],
    ) -> Result<UrlRequestResult, FetchError> {
        for method in [RequestMethod::Head, RequestMethod::Get] {
            match self.race_candidates(method, candidates).await {
                Ok(result) => {
                    debug!("Best URL for {} is {}", location, result.url);
                    return Ok(result);
                }
                Err(failures) => {
                    if let Some(fatal) = failures.into_iter().find(FetchError::is_fatal) {
                        return Err(fatal);
                    }
                    warn!("{} probe failed for every candidate of {}", method, location);
                }
            }
        }

        Err(FetchError::CandidateExhausted(location.clone()))
    }

    async fn race_candidates(
        &self,
        method: RequestMethod,
        candidates: &[Url],
    ) -> Result<UrlRequestResult, Vec<FetchError>> {
        self.race
            .run(candidates.iter().cloned().map(|url| {
                let prober = self.clone();
                move |_token: CancellationToken| async move {
                    let result = prober.probe(method, &url).await;
                    if let Err(e) = &result
                        && e.is_fatal()
                    {
                        warn!("{} {} failed: {}", method, url, e);
                    }
                    result
                }
            }))
            .await
            .map(|winner| winner.value)
            .map_err(RaceError::into_failures)
    }
}
