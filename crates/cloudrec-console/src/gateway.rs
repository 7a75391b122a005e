//! Mutation gateway
//!
//! Every state-changing request goes through here so that no mutation is
//! sent without a currently affirmed lock. Callers must re-fetch after a
//! successful mutation; nothing is updated locally.

use std::sync::Arc;

use tracing::info;

use cloudrec_api::{RuleRecord, SaveRuleRecord};
use cloudrec_common::{CloudRecError, Result};

use crate::datasource::RuleRecordStore;
use crate::lock::LockCoordinator;

pub struct MutationGateway {
    store: Arc<dyn RuleRecordStore>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn RuleRecordStore>) -> Self {
        Self { store }
    }

    pub async fn set_enabled(&self, record: &RuleRecord, enabled: bool) -> Result<()> {
        LockCoordinator::guard(record, || self.store.set_enabled(record.id, enabled)).await?;
        info!(id = record.id, enabled, "Whited rule status change accepted");
        Ok(())
    }

    /// Terminal; the record cannot be recovered afterwards
    pub async fn delete(&self, record: &RuleRecord) -> Result<()> {
        LockCoordinator::guard(record, || self.store.delete_record(record.id)).await?;
        info!(id = record.id, "Whited rule deletion accepted");
        Ok(())
    }

    /// Create or update a record.
    ///
    /// Creates need no lock. Updates need `current`, the latest snapshot of
    /// the record being edited, and are gated on its lock projection. The form
    /// is validated first; an invalid form never reaches the store.
    pub async fn save(&self, form: &SaveRuleRecord, current: Option<&RuleRecord>) -> Result<i64> {
        form.check()?;

        let id = match (form.id, current) {
            (None, _) => self.store.save_record(form).await?,
            (Some(id), Some(record)) if record.id == id => {
                LockCoordinator::guard(record, || self.store.save_record(form)).await?
            }
            (Some(id), _) => {
                return Err(CloudRecError::IllegalArgument(format!(
                    "update of record {} requires its current snapshot",
                    id
                )));
            }
        };
        info!(id, update = form.is_update(), "Whited rule saved");
        Ok(id)
    }
}
