// Rule record store abstraction layer
// Provides a unified interface for console operations in both local and remote modes

pub mod local;
pub mod remote;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::info;

use cloudrec_api::{
    AggregateGroup, GroupQuery, LockStatus, Page, RecordQuery, RuleRecord, SaveRuleRecord,
    WhitedOperator,
};
use cloudrec_common::Result;
use cloudrec_core::{Caller, LockService, MemoryRuleStore};

use crate::config::ConsoleConfig;

/// Interval of the lease expiry sweeper in local mode
const LOCK_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Authoritative store of whited rule records.
///
/// Every method is evaluated relative to the caller the store is bound to;
/// the lock projection on returned records is only valid for that caller
/// and only as of the call that produced it.
#[async_trait]
pub trait RuleRecordStore: Send + Sync {
    // ============== Lock Operations ==============

    /// Request the edit lock; returns the lock state after the attempt
    async fn grab_lock(&self, id: i64) -> Result<LockStatus>;

    /// Give the edit lock back; a no-op when the caller is not the holder
    async fn release_lock(&self, id: i64) -> Result<()>;

    // ============== Query Operations ==============

    async fn list_records(
        &self,
        query: &RecordQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<RuleRecord>>;

    async fn list_grouped_by_code(
        &self,
        query: &GroupQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<AggregateGroup>>;

    async fn get_record(&self, id: i64) -> Result<RuleRecord>;

    // ============== Mutation Operations ==============

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()>;

    async fn delete_record(&self, id: i64) -> Result<()>;

    /// Create (no id) or update (id set) a record; returns its id
    async fn save_record(&self, form: &SaveRuleRecord) -> Result<i64>;

    /// Operators accepted in rule config items
    async fn operators(&self) -> Result<Vec<WhitedOperator>> {
        Ok(WhitedOperator::ALL.to_vec())
    }
}

/// Create a rule record store based on configuration
pub async fn create_store(config: &ConsoleConfig) -> anyhow::Result<Arc<dyn RuleRecordStore>> {
    if config.is_remote_mode() {
        let remote = remote::RemoteRuleStore::new(config).await?;
        info!(servers = ?config.remote_server_addrs(), "Console using remote rule store");
        Ok(Arc::new(remote))
    } else {
        let locks = LockService::with_lease_ms(config.lock_policy()?, config.lease_ttl_ms());
        // The sweeper runs for the life of the process
        let _sweeper = locks.spawn_sweeper(LOCK_SWEEP_INTERVAL);
        let store = Arc::new(MemoryRuleStore::new(locks));
        let caller = Caller::new(config.local_user_id(), config.local_username());
        info!(
            user = %caller.user_id,
            policy = ?config.lock_policy()?,
            "Console using in-process rule store"
        );
        Ok(Arc::new(store.for_caller(caller)))
    }
}
