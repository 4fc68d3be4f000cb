//! Resources tracked through initialization and download
//!
//! A [`Resource`] is identified by its location and requested version. Its
//! status moves `Incomplete → Downloading → Downloaded | Error`; an errored
//! resource may be reset to `Incomplete` for a retry. Waiters subscribe to
//! status changes through a `watch` channel.

mod policy;

pub use policy::{DownloadOptions, UpdatePolicy};

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use reqwest::Url;
use tokio::sync::watch;
use tracing::debug;

use crate::version::VersionString;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Incomplete,
    Downloading,
    Downloaded,
    Error,
}

impl ResourceStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceStatus::Downloaded | ResourceStatus::Error)
    }

    fn can_transition_to(self, next: ResourceStatus) -> bool {
        use ResourceStatus::*;

        matches!(
            (self, next),
            (Incomplete, Downloading | Downloaded | Error)
                | (Downloading, Downloaded | Error)
                | (Error, Incomplete)
        )
    }
}

#[derive(Debug, Default)]
struct TransferState {
    local_file: Option<PathBuf>,
    size: Option<u64>,
    transferred: u64,
}

#[derive(Debug)]
pub struct Resource {
    location: Url,
    request_version: Option<VersionString>,
    download_options: DownloadOptions,
    update_policy: UpdatePolicy,
    transfer: Mutex<TransferState>,
    status: watch::Sender<ResourceStatus>,
    processing: AtomicBool,
}

impl Resource {
    pub fn new(
        location: Url,
        request_version: Option<VersionString>,
        download_options: DownloadOptions,
        update_policy: UpdatePolicy,
    ) -> Self {
        let (status, _) = watch::channel(ResourceStatus::Incomplete);
        Self {
            location,
            request_version,
            download_options,
            update_policy,
            transfer: Mutex::new(TransferState::default()),
            status,
            processing: AtomicBool::new(false),
        }
    }

    pub fn location(&self) -> &Url {
        &self.location
    }

    pub fn request_version(&self) -> Option<&VersionString> {
        self.request_version.as_ref()
    }

    pub fn download_options(&self) -> DownloadOptions {
        self.download_options
    }

    pub fn update_policy(&self) -> UpdatePolicy {
        self.update_policy
    }

    pub fn force_update_requested(&self) -> bool {
        self.update_policy == UpdatePolicy::Force
    }

    pub fn status(&self) -> ResourceStatus {
        *self.status.borrow()
    }

    pub fn is_complete(&self) -> bool {
        self.status().is_terminal()
    }

    fn lock_transfer(&self) -> MutexGuard<'_, TransferState> {
        self.transfer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn local_file(&self) -> Option<PathBuf> {
        self.lock_transfer().local_file.clone()
    }

    /// Total size in bytes, `None` while unknown
    pub fn size(&self) -> Option<u64> {
        self.lock_transfer().size
    }

    pub fn set_size(&self, size: Option<u64>) {
        self.lock_transfer().size = size;
    }

    pub fn transferred(&self) -> u64 {
        self.lock_transfer().transferred
    }

    pub fn set_transferred(&self, transferred: u64) {
        self.lock_transfer().transferred = transferred;
    }

    fn transition(&self, next: ResourceStatus) -> bool {
        let changed = self.status.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                false
            }
        });

        if !changed {
            debug!(
                "Ignoring status change of {} from {:?} to {:?}",
                self.location,
                self.status(),
                next
            );
        }
        changed
    }

    pub fn mark_downloading(&self) -> bool {
        self.transition(ResourceStatus::Downloading)
    }

    /// Records the local copy and then publishes `Downloaded`, so waiters
    /// never observe a completed resource without a file
    pub fn mark_downloaded(&self, local_file: PathBuf, size: u64) -> bool {
        {
            let mut transfer = self.lock_transfer();
            transfer.local_file = Some(local_file);
            transfer.size = Some(size);
        }
        self.transition(ResourceStatus::Downloaded)
    }

    pub fn mark_error(&self) -> bool {
        self.transition(ResourceStatus::Error)
    }

    /// Moves an errored resource back to `Incomplete` so it can be retried
    pub fn reset_for_retry(&self) -> bool {
        self.transition(ResourceStatus::Incomplete)
    }

    /// Claims the resource for processing; only one caller at a time wins
    pub fn try_claim(&self) -> bool {
        self.processing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn release(&self) {
        self.processing.store(false, Ordering::Release);
    }

    pub fn is_being_processed(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Waits until the resource is `Downloaded` or `Error`
    pub async fn wait_for_completion(&self) -> ResourceStatus {
        let mut receiver = self.status.subscribe();
        receiver
            .wait_for(|status| status.is_terminal())
            .await
            .map(|status| *status)
            .unwrap_or_else(|_| self.status())
    }
}
