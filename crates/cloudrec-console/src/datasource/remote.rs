//! Remote data source implementation
//!
//! Provides HTTP-based access to the whited rule store of a CloudRec server.
//! Uses cloudrec-client for HTTP communication.

use async_trait::async_trait;
use tracing::debug;

use cloudrec_api::{
    AggregateGroup, GroupQuery, LockStatus, Page, RecordQuery, RuleRecord, SaveRuleRecord,
    WhitedOperator,
};
use cloudrec_client::{CloudRecHttpClient, HttpClientConfig, WhitedRuleApiClient};
use cloudrec_common::Result;

use super::RuleRecordStore;
use crate::config::ConsoleConfig;

/// Remote data source - HTTP-based access to a CloudRec server
pub struct RemoteRuleStore {
    api_client: WhitedRuleApiClient,
}

impl RemoteRuleStore {
    pub async fn new(config: &ConsoleConfig) -> anyhow::Result<Self> {
        let http_config = HttpClientConfig::with_servers(config.remote_server_addrs())
            .with_auth(&config.remote_username(), &config.remote_password())
            .with_timeouts(
                config.remote_connect_timeout_ms(),
                config.remote_read_timeout_ms(),
            )
            .with_context_path(&config.remote_context_path());

        let http_client = CloudRecHttpClient::new(http_config).await?;
        Ok(Self::with_client(WhitedRuleApiClient::new(http_client)))
    }

    pub fn with_client(api_client: WhitedRuleApiClient) -> Self {
        Self { api_client }
    }
}

#[async_trait]
impl RuleRecordStore for RemoteRuleStore {
    async fn grab_lock(&self, id: i64) -> Result<LockStatus> {
        if let Some(status) = self.api_client.grab_lock(id).await? {
            return Ok(status);
        }
        // No status in the answer: read the lock state back from the record
        debug!(id, "grabLock returned no lock status, re-reading record");
        Ok(self.get_record(id).await?.lock)
    }

    async fn release_lock(&self, id: i64) -> Result<()> {
        Ok(self.api_client.release_lock(id).await?)
    }

    async fn list_records(
        &self,
        query: &RecordQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<RuleRecord>> {
        Ok(self.api_client.list(query, page, size).await?)
    }

    async fn list_grouped_by_code(
        &self,
        query: &GroupQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<AggregateGroup>> {
        Ok(self
            .api_client
            .list_group_by_rule_code(query, page, size)
            .await?)
    }

    async fn get_record(&self, id: i64) -> Result<RuleRecord> {
        Ok(self.api_client.detail(id).await?)
    }

    async fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        Ok(self.api_client.change_status(id, enabled).await?)
    }

    async fn delete_record(&self, id: i64) -> Result<()> {
        Ok(self.api_client.delete(id).await?)
    }

    async fn save_record(&self, form: &SaveRuleRecord) -> Result<i64> {
        Ok(self.api_client.save(form).await?)
    }

    async fn operators(&self) -> Result<Vec<WhitedOperator>> {
        Ok(self.api_client.operators().await?)
    }
}
