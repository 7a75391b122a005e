//! Whited rule models
//!
//! A [`RuleRecord`] is one whitelist rule instance as returned by a query.
//! Its [`LockStatus`] is a projection computed for the caller that issued the
//! query; it is never stored with the record and must not be reused across
//! callers or across fetches.

use serde::{Deserialize, Serialize};
use validator::Validate;

use cloudrec_common::{CloudRecError, RuleScope};

use crate::validation::{validate_condition, validate_rule_code, validate_rule_name};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleType {
    #[default]
    RuleEngine,
    Rego,
}

impl RuleType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RuleType::RuleEngine => "RULE_ENGINE",
            RuleType::Rego => "REGO",
        }
    }
}

impl std::fmt::Display for RuleType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RuleType {
    type Err = CloudRecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RULE_ENGINE" => Ok(RuleType::RuleEngine),
            "REGO" => Ok(RuleType::Rego),
            _ => Err(CloudRecError::Validation(
                "ruleType must be RULE_ENGINE or REGO".to_string(),
            )),
        }
    }
}

/// Comparison applied by one whitelist config item
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WhitedOperator {
    #[default]
    Eq,
    Ne,
    Like,
    NotLike,
    /// Value is a comma separated list
    In,
    NotIn,
}

impl WhitedOperator {
    pub const ALL: [WhitedOperator; 6] = [
        WhitedOperator::Eq,
        WhitedOperator::Ne,
        WhitedOperator::Like,
        WhitedOperator::NotLike,
        WhitedOperator::In,
        WhitedOperator::NotIn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WhitedOperator::Eq => "EQ",
            WhitedOperator::Ne => "NE",
            WhitedOperator::Like => "LIKE",
            WhitedOperator::NotLike => "NOT_LIKE",
            WhitedOperator::In => "IN",
            WhitedOperator::NotIn => "NOT_IN",
        }
    }

    pub fn takes_list(&self) -> bool {
        matches!(self, WhitedOperator::In | WhitedOperator::NotIn)
    }
}

impl std::fmt::Display for WhitedOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for WhitedOperator {
    type Err = CloudRecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WhitedOperator::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| CloudRecError::Validation(format!("unknown operator '{}'", s)))
    }
}

/// One `key operator value` item of a whitelist rule; conditions refer to it by `id`
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleConfigItem {
    pub id: u32,
    pub key: String,
    pub operator: WhitedOperator,
    pub value: String,
}

impl RuleConfigItem {
    /// Parse the `key:OPERATOR:value` command line form; the value may contain colons
    pub fn parse(id: u32, text: &str) -> Result<Self, CloudRecError> {
        let mut parts = text.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(operator), Some(value)) => Ok(Self {
                id,
                key: key.trim().to_string(),
                operator: operator.trim().parse()?,
                value: value.trim().to_string(),
            }),
            _ => Err(CloudRecError::Validation(format!(
                "config item '{}' must look like key:OPERATOR:value",
                text
            ))),
        }
    }

    /// Values of a list operator, or the single value otherwise
    pub fn values(&self) -> Vec<&str> {
        if self.operator.takes_list() {
            self.value
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .collect()
        } else {
            vec![self.value.as_str()]
        }
    }
}

/// Lock state of a record as seen by one caller
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LockStatus {
    #[serde(default)]
    pub is_lock_holder: bool,
    #[serde(default)]
    pub lock_holder_name: Option<String>,
}

impl LockStatus {
    pub fn held_by_caller(name: impl Into<String>) -> Self {
        Self {
            is_lock_holder: true,
            lock_holder_name: Some(name.into()),
        }
    }

    pub fn held_by_other(name: Option<String>) -> Self {
        Self {
            is_lock_holder: false,
            lock_holder_name: name,
        }
    }

    pub fn unlocked() -> Self {
        Self::default()
    }
}

/// One whited rule record, with the lock projection for the querying caller
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleRecord {
    pub id: i64,
    #[serde(default, alias = "riskRuleCode")]
    pub rule_code: String,
    #[serde(default)]
    pub rule_name: String,
    #[serde(default)]
    pub rule_desc: Option<String>,
    #[serde(default)]
    pub rule_type: RuleType,
    #[serde(rename = "enable", default, with = "enable_flag")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_config_list: Vec<RuleConfigItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rego_content: Option<String>,
    #[serde(flatten)]
    pub lock: LockStatus,
    #[serde(default)]
    pub tenant_id: Option<i64>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default)]
    pub creator_name: Option<String>,
    #[serde(default, rename = "gmtCreate")]
    pub created_at: Option<String>,
    #[serde(default, rename = "gmtModified")]
    pub modified_at: Option<String>,
}

impl RuleRecord {
    pub fn scope(&self) -> RuleScope {
        RuleScope::from_code(&self.rule_code)
    }

    pub fn is_lock_holder(&self) -> bool {
        self.lock.is_lock_holder
    }

    pub fn lock_holder_name(&self) -> Option<&str> {
        self.lock.lock_holder_name.as_deref()
    }
}

/// Derived summary row: all records sharing one rule code
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateGroup {
    pub rule_code: String,
    #[serde(default, alias = "ruleName")]
    pub display_name: String,
    #[serde(default)]
    pub count: u64,
}

impl AggregateGroup {
    pub fn scope(&self) -> RuleScope {
        RuleScope::from_code(&self.rule_code)
    }
}

/// Filter for the detail list
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_code: Option<String>,
    /// Matched against the record's display name only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_type: Option<RuleType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator_name: Option<String>,
}

impl RecordQuery {
    pub fn for_rule_code(rule_code: impl Into<String>) -> Self {
        Self {
            rule_code: Some(rule_code.into()),
            ..Default::default()
        }
    }

    pub fn with_rule_name(mut self, rule_name: Option<String>) -> Self {
        self.rule_name = rule_name.filter(|n| !n.trim().is_empty());
        self
    }

    /// Local evaluation of the filter, used by in-process stores
    pub fn matches(&self, record: &RuleRecord) -> bool {
        if let Some(code) = &self.rule_code
            && RuleScope::from_code(code) != record.scope()
        {
            return false;
        }
        if let Some(name) = &self.rule_name
            && !record.rule_name.contains(name.as_str())
        {
            return false;
        }
        if let Some(rule_type) = self.rule_type
            && rule_type != record.rule_type
        {
            return false;
        }
        if let Some(tenant_id) = self.tenant_id
            && record.tenant_id != Some(tenant_id)
        {
            return false;
        }
        if let Some(creator) = &self.creator_name
            && record.creator_name.as_deref() != Some(creator.as_str())
        {
            return false;
        }
        true
    }
}

/// Filter for the aggregate list; an empty code list selects every group
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_code_list: Vec<String>,
}

impl GroupQuery {
    pub fn with_codes<I, S>(codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            rule_code_list: codes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn selects(&self, rule_code: &str) -> bool {
        if self.rule_code_list.is_empty() {
            return true;
        }
        let scope = RuleScope::from_code(rule_code);
        self.rule_code_list
            .iter()
            .any(|c| RuleScope::from_code(c) == scope)
    }
}

/// Create/update form for a whited rule
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SaveRuleRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "riskRuleCode", default)]
    #[validate(custom(function = "validate_rule_code"))]
    pub rule_code: String,
    #[validate(custom(function = "validate_rule_name"))]
    pub rule_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_desc: Option<String>,
    pub rule_type: RuleType,
    #[serde(rename = "enable", with = "enable_flag")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_config_list: Vec<RuleConfigItem>,
    /// Logic over config item ids, e.g. `1 && 2`; required with more than one item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rego_content: Option<String>,
}

impl SaveRuleRecord {
    pub fn is_update(&self) -> bool {
        self.id.is_some()
    }

    /// Form-level checks; failures never reach the network
    pub fn check(&self) -> Result<(), CloudRecError> {
        self.validate()
            .map_err(|e| CloudRecError::Validation(e.to_string()))?;
        if self.rule_type == RuleType::Rego
            && self
                .rego_content
                .as_deref()
                .is_none_or(|c| c.trim().is_empty())
        {
            return Err(CloudRecError::Validation(
                "regoContent is required for REGO rules".to_string(),
            ));
        }
        self.check_rule_config()
    }

    fn check_rule_config(&self) -> Result<(), CloudRecError> {
        let mut ids = Vec::with_capacity(self.rule_config_list.len());
        for item in &self.rule_config_list {
            if item.key.trim().is_empty() || item.values().iter().all(|v| v.trim().is_empty()) {
                return Err(CloudRecError::Validation(format!(
                    "config item {} needs a key and a value",
                    item.id
                )));
            }
            if ids.contains(&item.id) {
                return Err(CloudRecError::Validation(format!(
                    "config item id {} is used more than once",
                    item.id
                )));
            }
            ids.push(item.id);
        }

        match self.condition.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
            Some(condition) => validate_condition(condition, &ids).map_err(|_| {
                CloudRecError::Validation(format!("{}: condition is not valid", self.rule_name))
            }),
            None if ids.len() > 1 => Err(CloudRecError::Validation(
                "condition is required when more than one config item is given".to_string(),
            )),
            None => Ok(()),
        }
    }
}

/// The remote store encodes `enable` as `0`/`1`; older payloads use booleans
pub mod enable_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Int(i64),
        Bool(bool),
    }

    pub fn serialize<S: Serializer>(value: &bool, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i32(if *value { 1 } else { 0 })
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
        Ok(match Flag::deserialize(deserializer)? {
            Flag::Int(v) => v == 1,
            Flag::Bool(v) => v,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rule_record_from_wire() {
        let record: RuleRecord = serde_json::from_value(json!({
            "id": 42,
            "riskRuleCode": "ECS_PUBLIC_IP",
            "ruleName": "office egress",
            "ruleType": "REGO",
            "enable": 1,
            "isLockHolder": true,
            "lockHolderName": "alice",
            "tenantId": 3,
            "creatorName": "bob",
            "gmtCreate": "2025-03-13 10:00:00",
            "gmtModified": "2025-03-14 11:00:00"
        }))
        .unwrap();

        assert_eq!(record.id, 42);
        assert_eq!(record.rule_code, "ECS_PUBLIC_IP");
        assert_eq!(record.rule_type, RuleType::Rego);
        assert!(record.enabled);
        assert!(record.is_lock_holder());
        assert_eq!(record.lock_holder_name(), Some("alice"));
        assert_eq!(record.created_at.as_deref(), Some("2025-03-13 10:00:00"));
    }

    #[test]
    fn test_rule_record_lock_fields_default_to_unlocked() {
        let record: RuleRecord =
            serde_json::from_value(json!({"id": 1, "ruleCode": "X", "enable": false})).unwrap();
        assert!(!record.enabled);
        assert_eq!(record.lock, LockStatus::unlocked());
    }

    #[test]
    fn test_enable_serialized_as_int() {
        let record = RuleRecord {
            id: 1,
            enabled: true,
            ..Default::default()
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["enable"], json!(1));
        assert_eq!(value["isLockHolder"], json!(false));
    }

    #[test]
    fn test_aggregate_group_accepts_rule_name() {
        let group: AggregateGroup =
            serde_json::from_value(json!({"ruleCode": "GLOBAL", "ruleName": "", "count": 4}))
                .unwrap();
        assert!(group.scope().is_global());
        assert_eq!(group.count, 4);
    }

    #[test]
    fn test_record_query_matches() {
        let record = RuleRecord {
            id: 1,
            rule_code: "GLOBAL".to_string(),
            rule_name: "office egress".to_string(),
            creator_name: Some("bob".to_string()),
            ..Default::default()
        };
        assert!(RecordQuery::for_rule_code("GLOBAL_CONFIG").matches(&record));
        assert!(
            RecordQuery::for_rule_code("GLOBAL_CONFIG")
                .with_rule_name(Some("egress".to_string()))
                .matches(&record)
        );
        assert!(
            !RecordQuery::for_rule_code("GLOBAL_CONFIG")
                .with_rule_name(Some("vpn".to_string()))
                .matches(&record)
        );
        assert!(!RecordQuery::for_rule_code("OTHER").matches(&record));
        let by_creator = RecordQuery {
            creator_name: Some("carol".to_string()),
            ..Default::default()
        };
        assert!(!by_creator.matches(&record));
    }

    #[test]
    fn test_blank_name_filter_is_dropped() {
        let query = RecordQuery::for_rule_code("A").with_rule_name(Some("  ".to_string()));
        assert!(query.rule_name.is_none());
    }

    #[test]
    fn test_group_query_selects() {
        assert!(GroupQuery::default().selects("ANY"));
        let query = GroupQuery::with_codes(["GLOBAL_CONFIG", "A"]);
        assert!(query.selects("GLOBAL"));
        assert!(query.selects("A"));
        assert!(!query.selects("B"));
    }

    #[test]
    fn test_save_rule_record_check() {
        let mut form = SaveRuleRecord {
            rule_code: "ECS_PUBLIC_IP".to_string(),
            rule_name: "office egress".to_string(),
            rule_type: RuleType::RuleEngine,
            enabled: true,
            ..Default::default()
        };
        assert!(form.check().is_ok());

        form.rule_type = RuleType::Rego;
        assert!(matches!(form.check(), Err(CloudRecError::Validation(_))));
        form.rego_content = Some("package whited".to_string());
        assert!(form.check().is_ok());

        form.rule_name.clear();
        assert!(matches!(form.check(), Err(CloudRecError::Validation(_))));
    }

    fn item(id: u32, key: &str, operator: WhitedOperator, value: &str) -> RuleConfigItem {
        RuleConfigItem {
            id,
            key: key.to_string(),
            operator,
            value: value.to_string(),
        }
    }

    #[test]
    fn test_rule_config_condition_check() {
        let mut form = SaveRuleRecord {
            rule_code: "ECS_PUBLIC_IP".to_string(),
            rule_name: "office egress".to_string(),
            rule_type: RuleType::RuleEngine,
            enabled: true,
            rule_config_list: vec![item(1, "instance.ip", WhitedOperator::Eq, "10.0.0.1")],
            ..Default::default()
        };
        // A single item needs no condition
        assert!(form.check().is_ok());

        form.rule_config_list
            .push(item(2, "instance.region", WhitedOperator::In, "cn-hangzhou, cn-beijing"));
        assert!(matches!(form.check(), Err(CloudRecError::Validation(_))));

        form.condition = Some("1 && 2".to_string());
        assert!(form.check().is_ok());

        form.condition = Some("1 && 3".to_string());
        assert_eq!(
            form.check().unwrap_err(),
            CloudRecError::Validation("office egress: condition is not valid".to_string())
        );

        form.condition = Some("1 ||".to_string());
        assert!(form.check().is_err());

        form.condition = Some("1 || 2".to_string());
        form.rule_config_list[1].id = 1;
        assert!(form.check().is_err());

        form.rule_config_list[1].id = 2;
        form.rule_config_list[1].value = " , ".to_string();
        assert!(form.check().is_err());
    }

    #[test]
    fn test_rule_config_wire_shape() {
        let form: SaveRuleRecord = serde_json::from_value(json!({
            "riskRuleCode": "ECS_PUBLIC_IP",
            "ruleName": "office egress",
            "ruleType": "RULE_ENGINE",
            "enable": 1,
            "ruleConfigList": [
                {"id": 1, "key": "instance.ip", "operator": "NOT_IN", "value": "1.1.1.1,2.2.2.2"}
            ]
        }))
        .unwrap();
        let config = &form.rule_config_list[0];
        assert_eq!(config.operator, WhitedOperator::NotIn);
        assert_eq!(config.values(), vec!["1.1.1.1", "2.2.2.2"]);

        let value = serde_json::to_value(&form).unwrap();
        assert_eq!(value["ruleConfigList"][0]["operator"], json!("NOT_IN"));
        assert!(value.get("condition").is_none());
    }

    #[test]
    fn test_rule_config_item_parse() {
        let parsed = RuleConfigItem::parse(3, "url:like:http://intranet").unwrap();
        assert_eq!(parsed, item(3, "url", WhitedOperator::Like, "http://intranet"));
        assert!(RuleConfigItem::parse(1, "ip:EQ").is_err());
        assert!(RuleConfigItem::parse(1, "ip:GT:3").is_err());
        assert_eq!(
            WhitedOperator::ALL.map(|op| op.to_string()).join(","),
            "EQ,NE,LIKE,NOT_LIKE,IN,NOT_IN"
        );
    }

    #[test]
    fn test_rule_type_from_str() {
        assert_eq!("REGO".parse::<RuleType>().unwrap(), RuleType::Rego);
        assert!("SQL".parse::<RuleType>().is_err());
    }
}
