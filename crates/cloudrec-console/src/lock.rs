//! Lock coordination
//!
//! The lock projection delivered with a [`RuleRecord`] is a snapshot taken
//! for one caller at one fetch. The coordinator trusts nothing else: it never
//! caches ownership and never infers it from a previous acquire.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use cloudrec_api::{LockStatus, RuleRecord};
use cloudrec_common::{CloudRecError, Result};

use crate::datasource::RuleRecordStore;

/// How a record may be presented to the caller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewMode {
    Edit,
    ReadOnly,
}

pub struct LockCoordinator {
    store: Arc<dyn RuleRecordStore>,
}

impl LockCoordinator {
    pub fn new(store: Arc<dyn RuleRecordStore>) -> Self {
        Self { store }
    }

    /// Request the lock of `id`. Any caller may try at any time; the answer
    /// is the store's authoritative state after the attempt. No retry.
    pub async fn acquire(&self, id: i64) -> Result<LockStatus> {
        let status = self.store.grab_lock(id).await?;
        if status.is_lock_holder {
            debug!(id, "Lock acquired");
        } else {
            warn!(
                id,
                holder = ?status.lock_holder_name,
                "Lock acquire did not transfer ownership"
            );
        }
        Ok(status)
    }

    /// Give the lock back, e.g. when an edit form is closed
    pub async fn release(&self, id: i64) -> Result<()> {
        self.store.release_lock(id).await?;
        debug!(id, "Lock released");
        Ok(())
    }

    pub fn can_mutate(record: &RuleRecord) -> bool {
        record.is_lock_holder()
    }

    pub fn view_mode(record: &RuleRecord) -> ViewMode {
        if Self::can_mutate(record) {
            ViewMode::Edit
        } else {
            ViewMode::ReadOnly
        }
    }

    /// Run `action` only when `record` says the caller holds the lock;
    /// otherwise fail with `LockNotHeld` without running it.
    pub async fn guard<T, F, Fut>(record: &RuleRecord, action: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !Self::can_mutate(record) {
            warn!(
                id = record.id,
                holder = ?record.lock_holder_name(),
                "Mutation blocked, lock not held"
            );
            return Err(CloudRecError::lock_not_held(
                record.id,
                record.lock_holder_name(),
            ));
        }
        action().await
    }
}
