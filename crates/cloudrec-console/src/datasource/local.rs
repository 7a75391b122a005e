//! Local data source implementation
//!
//! Serves the console from an in-process [`MemoryRuleStore`] through a
//! [`CallerSession`] bound to the console user.
//!
//! [`MemoryRuleStore`]: cloudrec_core::MemoryRuleStore

use async_trait::async_trait;

use cloudrec_api::{
    AggregateGroup, GroupQuery, LockStatus, Page, RecordQuery, RuleRecord, SaveRuleRecord,
};
use cloudrec_common::Result;
use cloudrec_core::CallerSession;

use super::RuleRecordStore;

#[async_trait]
impl RuleRecordStore for CallerSession {
    async fn grab_lock(&self, id: i64) -> Result<LockStatus> {
        CallerSession::grab_lock(self, id)
    }

    async fn release_lock(&self, id: i64) -> Result<()> {
        CallerSession::release_lock(self, id)
    }

    async fn list_records(
        &self,
        query: &RecordQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<RuleRecord>> {
        CallerSession::list_records(self, query, page, size)
    }

    async fn list_grouped_by_code(
        &self,
        query: &GroupQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<AggregateGroup>> {
        CallerSession::list_grouped_by_code(self, query, page, size)
    }

    async fn get_record(&self, id: i64) -> Result<RuleRecord> {
        CallerSession::get_record(self, id)
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        CallerSession::set_enabled(self, id, enabled)
    }

    async fn delete_record(&self, id: i64) -> Result<()> {
        CallerSession::delete_record(self, id)
    }

    async fn save_record(&self, form: &SaveRuleRecord) -> Result<i64> {
        CallerSession::save_record(self, form)
    }
}
