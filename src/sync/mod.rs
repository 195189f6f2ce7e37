//! Work record synchronization.

pub mod builder;
pub mod dispatcher;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::models::publication::SubmissionId;
use crate::registry::TransportError;

pub use builder::{build_work_record, WorkInputs};
pub use dispatcher::SyncDispatcher;

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// No response from the registry. Returned once the batch has settled.
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("store error: {0}")]
    Store(#[from] anyhow::Error),

    #[error("cannot build work record: {0}")]
    Build(#[source] anyhow::Error),
}

type LockMap = DashMap<SubmissionId, Arc<Mutex<()>>>;

/// One async mutex per submission, so two syncs of the same submission
/// never race on put-code updates. Entries live only while someone holds
/// or waits for them.
#[derive(Clone, Default)]
pub struct SubmissionLocks {
    inner: Arc<LockMap>,
}

impl SubmissionLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, submission_id: SubmissionId) -> SubmissionGuard {
        let lock = self.inner.entry(submission_id).or_default().clone();
        SubmissionGuard {
            submission_id,
            guard: Some(lock.lock_owned().await),
            locks: self.inner.clone(),
        }
    }
}

pub struct SubmissionGuard {
    submission_id: SubmissionId,
    guard: Option<OwnedMutexGuard<()>>,
    locks: Arc<LockMap>,
}

impl Drop for SubmissionGuard {
    fn drop(&mut self) {
        // the guard holds its own reference to the mutex
        drop(self.guard.take());
        self.locks
            .remove_if(&self.submission_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
