//! Prioritized parallel execution
//!
//! Runs an ordered list of candidate tasks concurrently and yields the result
//! of the highest-priority task that succeeds:
//!
//! ```text
//!   t0 ──ok──▶ result (t1..tn cancelled)
//!    │
//!   err
//!    ▼
//!   t1 ──ok──▶ result (t2..tn cancelled)
//!    │
//!   err
//!    ▼
//!   ...        all failed ──▶ RaceError::AllFailed
//! ```
//!
//! A lower-priority task keeps running while a higher-priority one is still
//! pending, so it can win as soon as everything above it has failed.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::DEFAULT_MAX_PARALLEL_DOWNLOADS;

/// Successful outcome of a race
#[derive(Debug, Clone, PartialEq)]
pub struct Winner<T> {
    /// Position of the winning task in the input order
    pub index: usize,
    pub value: T,
}

#[derive(Debug, Error)]
pub enum RaceError<E> {
    #[error("no candidate left")]
    NoCandidates,

    #[error("all {} candidates failed", .0.len())]
    AllFailed(Vec<E>),
}

impl<E> RaceError<E> {
    /// Failures in priority order
    pub fn into_failures(self) -> Vec<E> {
        match self {
            RaceError::NoCandidates => Vec::new(),
            RaceError::AllFailed(failures) => failures,
        }
    }
}

/// Shared worker pool for prioritized races.
///
/// Cloning is cheap; clones share the same concurrency limit.
#[derive(Debug, Clone)]
pub struct PrioritizedRace {
    permits: Arc<Semaphore>,
}

impl PrioritizedRace {
    pub fn new(max_parallel: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
        }
    }

    /// Starts every task and returns the first success in priority order.
    ///
    /// Each task receives a [`CancellationToken`] that is cancelled as soon as
    /// the race is decided (or the race future is dropped). Cancelled tasks
    /// are discarded at their next suspension point.
    pub async fn run<I, F, Fut, T, E>(&self, tasks: I) -> Result<Winner<T>, RaceError<E>>
    where
        I: IntoIterator<Item = F>,
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: From<JoinError> + Send + 'static,
    {
        let race_token = CancellationToken::new();
        // Cancels whatever is still running on every exit path
        let _cancel_on_exit = race_token.clone().drop_guard();

        let handles: Vec<_> = tasks
            .into_iter()
            .map(|task| {
                let token = race_token.child_token();
                let work = task(token.clone());
                let permits = Arc::clone(&self.permits);

                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => None,
                        result = async {
                            let _permit = permits.acquire_owned().await.ok();
                            work.await
                        } => Some(result),
                    }
                })
            })
            .collect();

        if handles.is_empty() {
            return Err(RaceError::NoCandidates);
        }

        let total = handles.len();
        let mut failures = Vec::with_capacity(total);

        for (index, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(Some(Ok(value))) => {
                    debug!("Candidate {}/{} won the race", index + 1, total);
                    return Ok(Winner { index, value });
                }
                Ok(Some(Err(e))) => {
                    debug!("Candidate {}/{} failed", index + 1, total);
                    failures.push(e);
                }
                // Only the race itself cancels tokens, and it stops awaiting
                // before doing so
                Ok(None) => {}
                Err(e) => failures.push(E::from(e)),
            }
        }

        Err(RaceError::AllFailed(failures))
    }
}

impl Default for PrioritizedRace {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PARALLEL_DOWNLOADS)
    }
}
