//! Shared collaborators of the acquisition pipeline

use std::sync::Arc;

use crate::cache::ResourceCache;
use crate::config::{FetchConfig, NetworkConfig};
use crate::downloader::{Pack200Decoder, PassthroughPack200Decoder};
use crate::error::FetchError;
use crate::http::build_client;
use crate::http::probe::{AuthenticationHook, DeclineAuthentication, UrlProber};
use crate::race::PrioritizedRace;

/// Everything initializers and downloaders need besides the resource itself.
///
/// Built once per session and shared behind an `Arc`.
#[derive(Clone)]
pub struct FetchContext {
    cache: Arc<dyn ResourceCache>,
    network: NetworkConfig,
    race: PrioritizedRace,
    prober: UrlProber,
    pack200: Arc<dyn Pack200Decoder>,
    offline: bool,
    session_start: i64,
}

impl FetchContext {
    pub fn new(cache: Arc<dyn ResourceCache>, config: &FetchConfig) -> Result<Self, FetchError> {
        let race = PrioritizedRace::new(config.network.max_parallel_downloads);
        let prober = UrlProber::new(
            build_client(&config.network)?,
            config.network.clone(),
            Arc::new(DeclineAuthentication),
            race.clone(),
        );

        Ok(Self {
            cache,
            network: config.network.clone(),
            race,
            prober,
            pack200: Arc::new(PassthroughPack200Decoder),
            offline: config.offline,
            session_start: chrono::Utc::now().timestamp_millis(),
        })
    }

    pub fn with_authentication_hook(
        mut self,
        hook: Arc<dyn AuthenticationHook>,
    ) -> Result<Self, FetchError> {
        self.prober = UrlProber::new(
            build_client(&self.network)?,
            self.network.clone(),
            hook,
            self.race.clone(),
        );
        Ok(self)
    }

    pub fn with_pack200_decoder(mut self, decoder: Arc<dyn Pack200Decoder>) -> Self {
        self.pack200 = decoder;
        self
    }

    /// Overrides the session start, in ms since the UNIX epoch
    pub fn with_session_start(mut self, session_start: i64) -> Self {
        self.session_start = session_start;
        self
    }

    pub fn cache(&self) -> &Arc<dyn ResourceCache> {
        &self.cache
    }

    pub fn network(&self) -> &NetworkConfig {
        &self.network
    }

    pub fn race(&self) -> &PrioritizedRace {
        &self.race
    }

    pub fn prober(&self) -> &UrlProber {
        &self.prober
    }

    pub fn pack200(&self) -> &Arc<dyn Pack200Decoder> {
        &self.pack200
    }

    pub fn is_offline(&self) -> bool {
        self.offline
    }

    pub fn session_start(&self) -> i64 {
        self.session_start
    }
}
