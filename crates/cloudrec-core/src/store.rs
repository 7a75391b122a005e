//! In-process whited rule store
//!
//! [`MemoryRuleStore`] behaves like a compliant backend: it owns the record
//! set and the edit leases, computes the lock projection per caller on every
//! read, and re-checks the lock on every mutation. All access goes through a
//! [`CallerSession`], which binds the operations to one caller identity.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local};
use dashmap::DashMap;
use tracing::{debug, info, warn};

use cloudrec_api::{
    AggregateGroup, GroupQuery, LockStatus, Page, RecordQuery, RuleConfigItem, RuleRecord,
    RuleType, SaveRuleRecord, paginate,
};
use cloudrec_common::{CloudRecError, Result, RuleScope};

use crate::lock::{LockHolder, LockService};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Identity of whoever issues a store operation
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub user_id: String,
    pub username: String,
    /// Records are visible only within this tenant; `None` sees every tenant
    pub tenant_id: Option<i64>,
}

impl Caller {
    pub fn new(user_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username: username.into(),
            tenant_id: None,
        }
    }

    pub fn with_tenant(mut self, tenant_id: i64) -> Self {
        self.tenant_id = Some(tenant_id);
        self
    }

    fn can_see(&self, tenant_id: Option<i64>) -> bool {
        self.tenant_id.is_none() || self.tenant_id == tenant_id
    }
}

#[derive(Clone, Debug)]
struct StoredRule {
    id: i64,
    rule_code: String,
    rule_name: String,
    rule_desc: Option<String>,
    rule_type: RuleType,
    enabled: bool,
    rule_config_list: Vec<RuleConfigItem>,
    condition: Option<String>,
    rego_content: Option<String>,
    tenant_id: Option<i64>,
    creator_name: String,
    created_at: DateTime<Local>,
    modified_at: DateTime<Local>,
}

/// Reference in-memory store of whited rule records
pub struct MemoryRuleStore {
    rules: DashMap<i64, StoredRule>,
    /// Display names of risk rules, keyed by rule code
    rule_names: DashMap<String, String>,
    tenant_names: DashMap<i64, String>,
    locks: LockService,
    next_id: AtomicI64,
}

impl Default for MemoryRuleStore {
    fn default() -> Self {
        Self::new(LockService::default())
    }
}

impl MemoryRuleStore {
    pub fn new(locks: LockService) -> Self {
        Self {
            rules: DashMap::new(),
            rule_names: DashMap::new(),
            tenant_names: DashMap::new(),
            locks,
            next_id: AtomicI64::new(1),
        }
    }

    pub fn locks(&self) -> &LockService {
        &self.locks
    }

    /// Register the display name of a risk rule code
    pub fn register_rule(&self, rule_code: &str, rule_name: &str) {
        self.rule_names
            .insert(rule_code.to_string(), rule_name.to_string());
    }

    pub fn register_tenant(&self, tenant_id: i64, tenant_name: &str) {
        self.tenant_names.insert(tenant_id, tenant_name.to_string());
    }

    /// Bind a caller to this store
    pub fn for_caller(self: &Arc<Self>, caller: Caller) -> CallerSession {
        CallerSession {
            store: self.clone(),
            caller,
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    fn project(&self, rule: &StoredRule, caller: &Caller) -> RuleRecord {
        let lock = match self.locks.holder(rule.id) {
            Some(LockHolder { owner, .. }) if owner == caller.user_id => {
                LockStatus::held_by_caller(caller.username.clone())
            }
            Some(holder) => LockStatus::held_by_other(Some(holder.owner_name)),
            None => LockStatus::unlocked(),
        };

        RuleRecord {
            id: rule.id,
            rule_code: rule.rule_code.clone(),
            rule_name: rule.rule_name.clone(),
            rule_desc: rule.rule_desc.clone(),
            rule_type: rule.rule_type,
            enabled: rule.enabled,
            rule_config_list: rule.rule_config_list.clone(),
            condition: rule.condition.clone(),
            rego_content: rule.rego_content.clone(),
            lock,
            tenant_id: rule.tenant_id,
            tenant_name: rule
                .tenant_id
                .and_then(|t| self.tenant_names.get(&t).map(|n| n.value().clone())),
            creator_name: Some(rule.creator_name.clone()),
            created_at: Some(rule.created_at.format(TIMESTAMP_FORMAT).to_string()),
            modified_at: Some(rule.modified_at.format(TIMESTAMP_FORMAT).to_string()),
        }
    }

    /// Visible records, newest first
    fn visible(&self, caller: &Caller) -> Vec<StoredRule> {
        let mut rules: Vec<StoredRule> = self
            .rules
            .iter()
            .filter(|r| caller.can_see(r.tenant_id))
            .map(|r| r.value().clone())
            .collect();
        rules.sort_by(|a, b| b.id.cmp(&a.id));
        rules
    }

    fn existing(&self, id: i64, caller: &Caller) -> Result<StoredRule> {
        self.rules
            .get(&id)
            .map(|r| r.value().clone())
            .filter(|r| caller.can_see(r.tenant_id))
            .ok_or_else(|| CloudRecError::not_found(id))
    }

    /// Run `write` only while `caller` holds the lock of `id`.
    ///
    /// The lease stays borrowed for the whole write, so a concurrent grab
    /// lands either before the check or after the write. `write` must not
    /// touch the lock service.
    fn with_lock<R>(
        &self,
        id: i64,
        caller: &Caller,
        operation: &str,
        write: impl FnOnce(&DashMap<i64, StoredRule>) -> Result<R>,
    ) -> Result<R> {
        match self
            .locks
            .while_held(id, &caller.user_id, || write(&self.rules))
        {
            Ok(result) => result,
            Err(holder) => {
                warn!(
                    id,
                    operation,
                    caller = %caller.user_id,
                    holder = ?holder.as_ref().map(|h| &h.owner),
                    "Rejected mutation, lock held by another user"
                );
                Err(CloudRecError::LockNotHeld {
                    id,
                    holder: holder.map(|h| h.owner_name),
                })
            }
        }
    }

    fn grab_lock(&self, caller: &Caller, id: i64) -> Result<LockStatus> {
        let rule = self.existing(id, caller)?;
        self.locks.acquire(id, &caller.user_id, &caller.username);
        Ok(self.project(&rule, caller).lock)
    }

    fn release_lock(&self, caller: &Caller, id: i64) -> Result<()> {
        self.existing(id, caller)?;
        if !self.locks.release(id, &caller.user_id) {
            debug!(id, caller = %caller.user_id, "Release ignored, caller is not the holder");
        }
        Ok(())
    }

    fn list_records(
        &self,
        caller: &Caller,
        query: &RecordQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<RuleRecord>> {
        if let Some(creator) = &query.creator_name
            && !self.rules.iter().any(|r| &r.creator_name == creator)
        {
            return Ok(Page::new(0, page.max(1), size, vec![]));
        }

        let records: Vec<RuleRecord> = self
            .visible(caller)
            .iter()
            .map(|r| self.project(r, caller))
            .filter(|r| query.matches(r))
            .collect();
        Ok(paginate(&records, page, size))
    }

    fn list_grouped_by_code(
        &self,
        caller: &Caller,
        query: &GroupQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<AggregateGroup>> {
        let mut groups: Vec<AggregateGroup> = Vec::new();
        for rule in self.visible(caller) {
            if !query.selects(&rule.rule_code) {
                continue;
            }
            let scope = RuleScope::from_code(&rule.rule_code);
            match groups
                .iter_mut()
                .find(|g| RuleScope::from_code(&g.rule_code) == scope)
            {
                Some(group) => group.count += 1,
                None => groups.push(AggregateGroup {
                    display_name: self
                        .rule_names
                        .get(scope.code())
                        .map(|n| n.value().clone())
                        .unwrap_or_default(),
                    rule_code: rule.rule_code.clone(),
                    count: 1,
                }),
            }
        }
        // Global scope always leads the first page
        groups.sort_by_key(|g| !RuleScope::from_code(&g.rule_code).is_global());
        Ok(paginate(&groups, page, size))
    }

    fn get_record(&self, caller: &Caller, id: i64) -> Result<RuleRecord> {
        let rule = self.existing(id, caller)?;
        Ok(self.project(&rule, caller))
    }

    fn set_enabled(&self, caller: &Caller, id: i64, enabled: bool) -> Result<()> {
        self.existing(id, caller)?;
        self.with_lock(id, caller, "changeStatus", |rules| {
            let mut rule = rules.get_mut(&id).ok_or_else(|| CloudRecError::not_found(id))?;
            rule.enabled = enabled;
            rule.modified_at = Local::now();
            Ok(())
        })?;
        info!(id, enabled, caller = %caller.user_id, "Whited rule status changed");
        Ok(())
    }

    fn delete_record(&self, caller: &Caller, id: i64) -> Result<()> {
        self.existing(id, caller)?;
        self.with_lock(id, caller, "delete", |rules| {
            rules
                .remove(&id)
                .map(|_| ())
                .ok_or_else(|| CloudRecError::not_found(id))
        })?;
        self.locks.forget(id);
        info!(id, caller = %caller.user_id, "Whited rule deleted");
        Ok(())
    }

    fn save_record(&self, caller: &Caller, form: &SaveRuleRecord) -> Result<i64> {
        form.check()?;

        match form.id {
            Some(id) => {
                self.existing(id, caller)?;
                self.with_lock(id, caller, "save", |rules| {
                    let mut rule = rules.get_mut(&id).ok_or_else(|| CloudRecError::not_found(id))?;
                    rule.rule_code = form.rule_code.clone();
                    rule.rule_name = form.rule_name.clone();
                    rule.rule_desc = form.rule_desc.clone();
                    rule.rule_type = form.rule_type;
                    rule.enabled = form.enabled;
                    rule.rule_config_list = form.rule_config_list.clone();
                    rule.condition = form.condition.clone();
                    rule.rego_content = form.rego_content.clone();
                    rule.modified_at = Local::now();
                    Ok(())
                })?;
                // Saving counts as activity on the lease, for its holder only
                self.locks.renew(id, &caller.user_id);
                info!(id, caller = %caller.user_id, "Whited rule updated");
                Ok(id)
            }
            None => {
                let duplicate = self
                    .rules
                    .iter()
                    .any(|r| r.rule_type == form.rule_type && r.rule_name == form.rule_name);
                if duplicate {
                    return Err(CloudRecError::Validation(format!(
                        "a {} rule named '{}' already exists",
                        form.rule_type, form.rule_name
                    )));
                }

                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                let now = Local::now();
                self.rules.insert(
                    id,
                    StoredRule {
                        id,
                        rule_code: form.rule_code.clone(),
                        rule_name: form.rule_name.clone(),
                        rule_desc: form.rule_desc.clone(),
                        rule_type: form.rule_type,
                        enabled: form.enabled,
                        rule_config_list: form.rule_config_list.clone(),
                        condition: form.condition.clone(),
                        rego_content: form.rego_content.clone(),
                        tenant_id: caller.tenant_id,
                        creator_name: caller.username.clone(),
                        created_at: now,
                        modified_at: now,
                    },
                );
                // The creator holds the lock of a new record
                self.locks.assign(id, &caller.user_id, &caller.username);
                info!(id, caller = %caller.user_id, "Whited rule created");
                Ok(id)
            }
        }
    }
}

/// A [`MemoryRuleStore`] bound to one caller
#[derive(Clone)]
pub struct CallerSession {
    store: Arc<MemoryRuleStore>,
    caller: Caller,
}

impl CallerSession {
    pub fn caller(&self) -> &Caller {
        &self.caller
    }

    pub fn store(&self) -> &Arc<MemoryRuleStore> {
        &self.store
    }

    pub fn grab_lock(&self, id: i64) -> Result<LockStatus> {
        self.store.grab_lock(&self.caller, id)
    }

    pub fn release_lock(&self, id: i64) -> Result<()> {
        self.store.release_lock(&self.caller, id)
    }

    pub fn list_records(&self, query: &RecordQuery, page: u64, size: u64) -> Result<Page<RuleRecord>> {
        self.store.list_records(&self.caller, query, page, size)
    }

    pub fn list_grouped_by_code(
        &self,
        query: &GroupQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<AggregateGroup>> {
        self.store
            .list_grouped_by_code(&self.caller, query, page, size)
    }

    pub fn get_record(&self, id: i64) -> Result<RuleRecord> {
        self.store.get_record(&self.caller, id)
    }

    pub fn set_enabled(&self, id: i64, enabled: bool) -> Result<()> {
        self.store.set_enabled(&self.caller, id, enabled)
    }

    pub fn delete_record(&self, id: i64) -> Result<()> {
        self.store.delete_record(&self.caller, id)
    }

    pub fn save_record(&self, form: &SaveRuleRecord) -> Result<i64> {
        self.store.save_record(&self.caller, form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lock::LockPolicy;

    fn form(code: &str, name: &str) -> SaveRuleRecord {
        SaveRuleRecord {
            rule_code: code.to_string(),
            rule_name: name.to_string(),
            rule_type: RuleType::RuleEngine,
            enabled: true,
            ..Default::default()
        }
    }

    fn sessions(store: MemoryRuleStore) -> (CallerSession, CallerSession) {
        let store = Arc::new(store);
        (
            store.for_caller(Caller::new("u-a", "A")),
            store.for_caller(Caller::new("u-b", "B")),
        )
    }

    #[test]
    fn test_creator_holds_lock() {
        let (a, b) = sessions(MemoryRuleStore::default());
        let id = a.save_record(&form("ECS_PUBLIC_IP", "office")).unwrap();

        let seen_by_a = a.get_record(id).unwrap();
        assert!(seen_by_a.is_lock_holder());
        assert_eq!(seen_by_a.creator_name.as_deref(), Some("A"));

        let seen_by_b = b.get_record(id).unwrap();
        assert!(!seen_by_b.is_lock_holder());
        assert_eq!(seen_by_b.lock_holder_name(), Some("A"));
    }

    #[test]
    fn test_grab_then_mutate() {
        let (a, b) = sessions(MemoryRuleStore::default());
        let id = a.save_record(&form("ECS_PUBLIC_IP", "office")).unwrap();

        assert!(matches!(
            b.set_enabled(id, false),
            Err(CloudRecError::LockNotHeld { holder: Some(ref h), .. }) if h == "A"
        ));

        let status = b.grab_lock(id).unwrap();
        assert!(status.is_lock_holder);
        b.set_enabled(id, false).unwrap();
        assert!(!a.get_record(id).unwrap().enabled);
        assert!(matches!(
            a.delete_record(id),
            Err(CloudRecError::LockNotHeld { .. })
        ));
    }

    #[test]
    fn test_exclusive_policy() {
        let (a, b) = sessions(MemoryRuleStore::new(LockService::new(
            LockPolicy::Exclusive,
            None,
        )));
        let id = a.save_record(&form("ECS_PUBLIC_IP", "office")).unwrap();

        let status = b.grab_lock(id).unwrap();
        assert!(!status.is_lock_holder);
        assert_eq!(status.lock_holder_name.as_deref(), Some("A"));

        a.release_lock(id).unwrap();
        assert!(b.grab_lock(id).unwrap().is_lock_holder);
    }

    #[test]
    fn test_release_by_non_holder_is_noop() {
        let (a, b) = sessions(MemoryRuleStore::default());
        let id = a.save_record(&form("X", "r")).unwrap();
        b.release_lock(id).unwrap();
        assert!(a.get_record(id).unwrap().is_lock_holder());
    }

    #[test]
    fn test_duplicate_name_rejected_on_create() {
        let (a, _) = sessions(MemoryRuleStore::default());
        a.save_record(&form("X", "same")).unwrap();
        assert!(matches!(
            a.save_record(&form("Y", "same")),
            Err(CloudRecError::Validation(_))
        ));

        let mut rego = form("Y", "same");
        rego.rule_type = RuleType::Rego;
        rego.rego_content = Some("package x".to_string());
        assert!(a.save_record(&rego).is_ok());
    }

    #[test]
    fn test_update_requires_lock() {
        let (a, b) = sessions(MemoryRuleStore::default());
        let id = a.save_record(&form("X", "r")).unwrap();

        let mut update = form("X", "renamed");
        update.id = Some(id);
        assert!(matches!(
            b.save_record(&update),
            Err(CloudRecError::LockNotHeld { .. })
        ));
        a.save_record(&update).unwrap();
        assert_eq!(b.get_record(id).unwrap().rule_name, "renamed");
    }

    #[test]
    fn test_missing_record() {
        let (a, _) = sessions(MemoryRuleStore::default());
        assert!(matches!(a.grab_lock(9), Err(CloudRecError::NotFound(_))));
        assert!(matches!(a.delete_record(9), Err(CloudRecError::NotFound(_))));
    }

    #[test]
    fn test_group_counts_and_names() {
        let store = MemoryRuleStore::default();
        store.register_rule("ECS_PUBLIC_IP", "ECS exposed to internet");
        let (a, _) = sessions(store);
        a.save_record(&form("ECS_PUBLIC_IP", "r1")).unwrap();
        a.save_record(&form("GLOBAL", "r2")).unwrap();
        a.save_record(&form("ECS_PUBLIC_IP", "r3")).unwrap();
        a.save_record(&form("GLOBAL_CONFIG", "r4")).unwrap();

        let page = a.list_grouped_by_code(&GroupQuery::default(), 1, 10).unwrap();
        assert_eq!(page.total_count, 2);
        let total: u64 = page.page_items.iter().map(|g| g.count).sum();
        assert_eq!(total, 4);
        let ecs = page
            .page_items
            .iter()
            .find(|g| g.rule_code == "ECS_PUBLIC_IP")
            .unwrap();
        assert_eq!(ecs.display_name, "ECS exposed to internet");

        let filtered = a
            .list_grouped_by_code(&GroupQuery::with_codes(["GLOBAL_CONFIG"]), 1, 10)
            .unwrap();
        assert_eq!(filtered.page_items.len(), 1);
        assert_eq!(filtered.page_items[0].count, 2);
    }

    #[test]
    fn test_list_records_filters() {
        let (a, b) = sessions(MemoryRuleStore::default());
        a.save_record(&form("X", "office egress")).unwrap();
        b.save_record(&form("X", "vpn range")).unwrap();
        a.save_record(&form("Y", "office nat")).unwrap();

        let page = a
            .list_records(
                &RecordQuery::for_rule_code("X").with_rule_name(Some("office".into())),
                1,
                10,
            )
            .unwrap();
        assert_eq!(page.total_count, 1);
        assert_eq!(page.page_items[0].rule_name, "office egress");

        let by_creator = RecordQuery {
            creator_name: Some("B".to_string()),
            ..Default::default()
        };
        assert_eq!(a.list_records(&by_creator, 1, 10).unwrap().total_count, 1);

        let unknown = RecordQuery {
            creator_name: Some("nobody".to_string()),
            ..Default::default()
        };
        assert!(a.list_records(&unknown, 1, 10).unwrap().is_empty());
    }

    #[test]
    fn test_update_never_takes_lock_back() {
        let (a, b) = sessions(MemoryRuleStore::default());
        let id = a.save_record(&form("X", "r")).unwrap();
        let mut update = form("X", "renamed");
        update.id = Some(id);

        b.grab_lock(id).unwrap();
        assert!(matches!(
            a.save_record(&update),
            Err(CloudRecError::LockNotHeld { holder: Some(ref h), .. }) if h == "B"
        ));
        assert!(b.get_record(id).unwrap().is_lock_holder());
        assert_eq!(b.get_record(id).unwrap().rule_name, "r");

        b.save_record(&update).unwrap();
        let seen_by_a = a.get_record(id).unwrap();
        assert_eq!(seen_by_a.rule_name, "renamed");
        assert_eq!(seen_by_a.lock_holder_name(), Some("B"));
    }

    #[test]
    fn test_save_renews_holder_lease() {
        let store = MemoryRuleStore::new(LockService::new(
            LockPolicy::Grab,
            Some(std::time::Duration::from_millis(150)),
        ));
        let (a, _) = sessions(store);
        let id = a.save_record(&form("X", "r")).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(100));
        let mut update = form("X", "renamed");
        update.id = Some(id);
        a.save_record(&update).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(100));
        assert!(a.get_record(id).unwrap().is_lock_holder());
    }

    #[test]
    fn test_concurrent_grab_and_mutation() {
        let store = Arc::new(MemoryRuleStore::default());
        let a = store.for_caller(Caller::new("u-a", "A"));
        let b = store.for_caller(Caller::new("u-b", "B"));
        let id = a.save_record(&form("X", "r")).unwrap();

        let writer = {
            let a = a.clone();
            std::thread::spawn(move || {
                let mut refused = 0;
                for i in 0..500 {
                    match a.set_enabled(id, i % 2 == 0) {
                        Ok(()) => assert_eq!(refused, 0, "write accepted after the lock moved"),
                        Err(CloudRecError::LockNotHeld { .. }) => refused += 1,
                        Err(other) => panic!("unexpected: {}", other),
                    }
                }
            })
        };
        b.grab_lock(id).unwrap();
        b.set_enabled(id, true).unwrap();
        writer.join().unwrap();

        assert!(b.get_record(id).unwrap().is_lock_holder());
        assert!(a.get_record(id).unwrap().enabled);
    }

    #[test]
    fn test_rule_config_list_is_stored() {
        let (a, b) = sessions(MemoryRuleStore::default());
        let mut with_items = form("X", "r");
        with_items.rule_config_list = vec![
            RuleConfigItem::parse(1, "ip:EQ:10.0.0.1").unwrap(),
            RuleConfigItem::parse(2, "region:IN:cn-hangzhou,cn-beijing").unwrap(),
        ];
        with_items.condition = Some("1 || 2".to_string());
        let id = a.save_record(&with_items).unwrap();

        let record = b.get_record(id).unwrap();
        assert_eq!(record.rule_config_list, with_items.rule_config_list);
        assert_eq!(record.condition.as_deref(), Some("1 || 2"));

        with_items.condition = Some("1 || 3".to_string());
        assert!(matches!(
            a.save_record(&with_items),
            Err(CloudRecError::Validation(_))
        ));
    }

    #[test]
    fn test_tenant_scoping() {
        let store = Arc::new(MemoryRuleStore::default());
        store.register_tenant(1, "default");
        let t1 = store.for_caller(Caller::new("u1", "one").with_tenant(1));
        let t2 = store.for_caller(Caller::new("u2", "two").with_tenant(2));

        let id = t1.save_record(&form("X", "r")).unwrap();
        assert_eq!(t1.get_record(id).unwrap().tenant_name.as_deref(), Some("default"));
        assert!(matches!(t2.get_record(id), Err(CloudRecError::NotFound(_))));
        assert!(
            t2.list_records(&RecordQuery::default(), 1, 10)
                .unwrap()
                .is_empty()
        );
    }
}
