//! Two-level browsing of whited rules
//!
//! The aggregate view shows one row per rule code; selecting a row drills
//! into the records of that code. The global scope is identified and labelled
//! only through [`RuleScope`], whichever sentinel the store used.

use std::sync::Arc;

use tracing::{debug, warn};

use cloudrec_api::{AggregateGroup, GroupQuery, Page, RecordQuery, RuleRecord};
use cloudrec_common::{GLOBAL_RULE_CODE, LEGACY_GLOBAL_RULE_CODE, Result, RuleScope};

use crate::datasource::RuleRecordStore;

/// Parameters for the detail list of one group
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NavigationIntent {
    pub scope: RuleScope,
    /// Heading of the detail view
    pub title: String,
    pub count: u64,
}

impl NavigationIntent {
    pub fn rule_code(&self) -> &str {
        self.scope.code()
    }

    pub fn query(&self, name_filter: Option<&str>) -> RecordQuery {
        RecordQuery::for_rule_code(self.scope.code())
            .with_rule_name(name_filter.map(str::to_string))
    }
}

/// Option of the rule-code multi-select filter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuleCodeOption {
    pub rule_code: String,
    pub label: String,
}

pub struct RuleAggregator {
    store: Arc<dyn RuleRecordStore>,
    page_size: u64,
}

impl RuleAggregator {
    pub fn new(store: Arc<dyn RuleRecordStore>, page_size: u64) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u64 {
        self.page_size
    }

    /// One row per rule code, global scope first
    pub async fn list_groups(
        &self,
        filter: &GroupQuery,
        page: u64,
        size: u64,
    ) -> Result<Page<AggregateGroup>> {
        let query = GroupQuery::with_codes(store_codes(&filter.rule_code_list));
        let result = self.store.list_grouped_by_code(&query, page, size).await?;
        let received = result.page_items.len();
        let page_items = normalize_groups(result.page_items);
        let merged_away = (received - page_items.len()) as u64;
        if merged_away > 0 {
            debug!(merged_away, "Merged duplicate global scope rows");
        }
        Ok(Page::new(
            result.total_count.saturating_sub(merged_away),
            result.page_number,
            size,
            page_items,
        ))
    }

    /// Records of one rule code, optionally narrowed by name.
    /// An empty result is a valid, empty page.
    pub async fn list_detail(
        &self,
        rule_code: &str,
        name_filter: Option<&str>,
        page: u64,
        size: u64,
    ) -> Result<Page<RuleRecord>> {
        let scope = RuleScope::from_code(rule_code);
        let query = RecordQuery::for_rule_code(scope.code())
            .with_rule_name(name_filter.map(str::to_string));
        let mut result = self.store.list_records(&query, page, size).await?;

        let before = result.page_items.len();
        result.page_items.retain(|r| r.scope() == scope);
        let dropped = before - result.page_items.len();
        if dropped > 0 {
            warn!(
                rule_code = %scope,
                dropped,
                "Store returned records outside the requested rule code"
            );
            return Ok(Page::new(
                result.total_count.saturating_sub(dropped as u64),
                result.page_number,
                size,
                result.page_items,
            ));
        }
        Ok(result)
    }

    /// Translate an aggregate row into detail-list parameters
    pub fn select_group(group: &AggregateGroup) -> NavigationIntent {
        let scope = group.scope();
        let title = scope.display_name(Some(group.display_name.as_str())).to_string();
        NavigationIntent {
            scope,
            title,
            count: group.count,
        }
    }

    /// Distinct rule codes for the multi-select filter, walking every page
    pub async fn rule_code_options(&self) -> Result<Vec<RuleCodeOption>> {
        let mut options: Vec<RuleCodeOption> = Vec::new();
        let mut page = 1;
        loop {
            let result = self
                .list_groups(&GroupQuery::default(), page, self.page_size)
                .await?;
            for group in &result.page_items {
                if !options.iter().any(|o| o.rule_code == group.rule_code) {
                    options.push(RuleCodeOption {
                        rule_code: group.rule_code.clone(),
                        label: group.display_name.clone(),
                    });
                }
            }
            if result.page_items.is_empty() || page >= result.pages_available {
                break;
            }
            page += 1;
        }
        Ok(options)
    }
}

/// Codes to send to the store for a selection; the global scope is sent
/// under both sentinels since stores disagree on which one they use
fn store_codes(selected: &[String]) -> Vec<String> {
    let mut codes: Vec<String> = Vec::with_capacity(selected.len() + 1);
    let mut push = |code: &str| {
        if !codes.iter().any(|existing| existing == code) {
            codes.push(code.to_string());
        }
    };
    for code in selected {
        let scope = RuleScope::from_code(code);
        if scope.is_global() {
            push(GLOBAL_RULE_CODE);
            push(LEGACY_GLOBAL_RULE_CODE);
        } else {
            push(scope.code());
        }
    }
    codes
}

/// Canonicalize group rows: one row per scope (counts summed, first
/// occurrence keeps its place), canonical codes and labels, global first.
pub fn normalize_groups(groups: Vec<AggregateGroup>) -> Vec<AggregateGroup> {
    let mut merged: Vec<AggregateGroup> = Vec::with_capacity(groups.len());
    for group in groups {
        let scope = group.scope();
        if let Some(existing) = merged.iter_mut().find(|g| g.scope() == scope) {
            existing.count += group.count;
            continue;
        }
        let display_name = scope.display_name(Some(group.display_name.as_str())).to_string();
        merged.push(AggregateGroup {
            rule_code: scope.code().to_string(),
            display_name,
            count: group.count,
        });
    }
    // Stable: every other row keeps the store's order
    merged.sort_by_key(|g| !g.scope().is_global());
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use cloudrec_api::{LockStatus, SaveRuleRecord};
    use cloudrec_common::{CloudRecError, GLOBAL_RULE_DISPLAY_NAME};
    use proptest::prelude::*;

    /// Answers group listings with a fixed page, as a store that keeps both
    /// global sentinels apart would
    struct FixedGroups(Page<AggregateGroup>);

    #[async_trait]
    impl RuleRecordStore for FixedGroups {
        async fn grab_lock(&self, id: i64) -> Result<LockStatus> {
            Err(CloudRecError::not_found(id))
        }

        async fn release_lock(&self, _id: i64) -> Result<()> {
            Ok(())
        }

        async fn list_records(
            &self,
            _query: &RecordQuery,
            page: u64,
            size: u64,
        ) -> Result<Page<RuleRecord>> {
            Ok(Page::new(0, page, size, vec![]))
        }

        async fn list_grouped_by_code(
            &self,
            _query: &GroupQuery,
            _page: u64,
            _size: u64,
        ) -> Result<Page<AggregateGroup>> {
            Ok(self.0.clone())
        }

        async fn get_record(&self, id: i64) -> Result<RuleRecord> {
            Err(CloudRecError::not_found(id))
        }

        async fn set_enabled(&self, id: i64, _enabled: bool) -> Result<()> {
            Err(CloudRecError::not_found(id))
        }

        async fn delete_record(&self, id: i64) -> Result<()> {
            Err(CloudRecError::not_found(id))
        }

        async fn save_record(&self, _form: &SaveRuleRecord) -> Result<i64> {
            Err(CloudRecError::Internal("read only".to_string()))
        }
    }

    fn group(code: &str, name: &str, count: u64) -> AggregateGroup {
        AggregateGroup {
            rule_code: code.to_string(),
            display_name: name.to_string(),
            count,
        }
    }

    #[test]
    fn test_global_sorted_first() {
        let groups = vec![
            group("B", "Rule B", 1),
            group("GLOBAL", "", 3),
            group("A", "Rule A", 2),
        ];
        let normalized = normalize_groups(groups);
        assert_eq!(normalized[0].rule_code, GLOBAL_RULE_CODE);
        assert_eq!(normalized[0].display_name, GLOBAL_RULE_DISPLAY_NAME);
        assert_eq!(normalized[1].rule_code, "B");
        assert_eq!(normalized[2].rule_code, "A");
    }

    #[test]
    fn test_both_sentinels_merge() {
        let groups = vec![
            group("GLOBAL_CONFIG", "", 2),
            group("A", "", 1),
            group("GLOBAL", "", 3),
        ];
        let normalized = normalize_groups(groups);
        assert_eq!(normalized.len(), 2);
        assert_eq!(normalized[0].count, 5);
        // Missing rule name falls back to the code
        assert_eq!(normalized[1].display_name, "A");
    }

    #[tokio::test]
    async fn test_merged_rows_recount_pages() {
        let mut rows = vec![group("GLOBAL", "", 2), group("GLOBAL_CONFIG", "", 1)];
        rows.extend((0..8).map(|i| group(&format!("RULE_{}", i), "", 1)));
        let store = FixedGroups(Page::new(11, 1, 10, rows));
        assert_eq!(store.0.pages_available, 2);

        let page = RuleAggregator::new(Arc::new(store), 10)
            .list_groups(&GroupQuery::default(), 1, 10)
            .await
            .unwrap();
        assert_eq!(page.page_items.len(), 9);
        assert_eq!(page.total_count, 10);
        assert_eq!(page.pages_available, 1);
        assert_eq!(page.page_items[0].count, 3);
    }

    #[test]
    fn test_select_group() {
        let intent = RuleAggregator::select_group(&group("GLOBAL", "", 4));
        assert!(intent.scope.is_global());
        assert_eq!(intent.rule_code(), GLOBAL_RULE_CODE);
        assert_eq!(intent.title, GLOBAL_RULE_DISPLAY_NAME);

        let intent = RuleAggregator::select_group(&group("ECS_PUBLIC_IP", "ECS exposed", 2));
        assert_eq!(intent.title, "ECS exposed");
        let query = intent.query(Some("office"));
        assert_eq!(query.rule_code.as_deref(), Some("ECS_PUBLIC_IP"));
        assert_eq!(query.rule_name.as_deref(), Some("office"));
    }

    #[test]
    fn test_store_codes_expand_global() {
        let codes = store_codes(&["A".to_string(), "GLOBAL".to_string(), "GLOBAL_CONFIG".to_string()]);
        assert_eq!(codes, vec!["A", "GLOBAL_CONFIG", "GLOBAL"]);
        assert!(store_codes(&[]).is_empty());
    }

    fn code_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("GLOBAL".to_string()),
            Just("GLOBAL_CONFIG".to_string()),
            "[A-D]".prop_map(|s| format!("RULE_{}", s)),
        ]
    }

    proptest! {
        #[test]
        fn prop_normalize_conserves_count(
            rows in prop::collection::vec((code_strategy(), 0u64..50), 0..20)
        ) {
            let groups: Vec<AggregateGroup> =
                rows.iter().map(|(c, n)| group(c, "", *n)).collect();
            let expected: u64 = groups.iter().map(|g| g.count).sum();

            let normalized = normalize_groups(groups);
            let actual: u64 = normalized.iter().map(|g| g.count).sum();
            prop_assert_eq!(actual, expected);

            let has_global = rows.iter().any(|(c, _)| RuleScope::from_code(c).is_global());
            if has_global {
                prop_assert!(normalized[0].scope().is_global());
            }
            let globals = normalized.iter().filter(|g| g.scope().is_global()).count();
            prop_assert!(globals <= 1);
        }
    }
}
