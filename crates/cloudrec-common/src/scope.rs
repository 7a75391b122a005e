//! Rule scope mapping
//!
//! A whited rule record is either scoped to a single risk rule (identified by
//! its rule code) or to the tenant-wide global configuration. The backend has
//! been observed to emit two different sentinels for the global scope, so
//! every identification and every display decision goes through [`RuleScope`].

use std::fmt::{Display, Formatter};

/// Canonical rule code of the global-configuration scope
pub const GLOBAL_RULE_CODE: &str = "GLOBAL_CONFIG";

/// Legacy sentinel some backend versions use when sorting aggregate rows
pub const LEGACY_GLOBAL_RULE_CODE: &str = "GLOBAL";

/// Fixed display label of the global-configuration group
pub const GLOBAL_RULE_DISPLAY_NAME: &str = "Global Configuration Whitelist";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RuleScope {
    Global,
    Rule(String),
}

impl RuleScope {
    pub fn from_code(code: &str) -> Self {
        if is_global_rule_code(code) {
            RuleScope::Global
        } else {
            RuleScope::Rule(code.to_string())
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self, RuleScope::Global)
    }

    /// Key sent to the backend when querying this scope
    pub fn code(&self) -> &str {
        match self {
            RuleScope::Global => GLOBAL_RULE_CODE,
            RuleScope::Rule(code) => code,
        }
    }

    /// Label shown for this scope; `rule_name` is used for non-global scopes
    /// and falls back to the code when empty
    pub fn display_name<'a>(&'a self, rule_name: Option<&'a str>) -> &'a str {
        match self {
            RuleScope::Global => GLOBAL_RULE_DISPLAY_NAME,
            RuleScope::Rule(code) => rule_name.filter(|n| !n.is_empty()).unwrap_or(code),
        }
    }
}

impl Display for RuleScope {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

pub fn is_global_rule_code(code: &str) -> bool {
    code == GLOBAL_RULE_CODE || code == LEGACY_GLOBAL_RULE_CODE
}
