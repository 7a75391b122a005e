//! CloudRec Common - Shared types and constants
//!
//! This crate provides the foundational types used across all console crates:
//! - Error taxonomy and error codes
//! - The global-scope rule code mapping
//! - Common constants

pub mod error;
pub mod scope;

// Re-exports for convenience
pub use error::{CloudRecError, ErrorCode, Result};
pub use scope::{
    GLOBAL_RULE_CODE, GLOBAL_RULE_DISPLAY_NAME, LEGACY_GLOBAL_RULE_CODE, RuleScope,
    is_global_rule_code,
};

/// Numeric `code` the remote store uses to signal success
pub const SUCCESS_CODE: i32 = 200;

/// Message the remote store pairs with a successful `code`
pub const SUCCESS_MSG: &str = "success";

/// Default page size for list views
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Query parameter names shared by list requests
pub const RULE_CODE: &str = "ruleCode";
pub const RULE_CODE_LIST: &str = "ruleCodeList";
pub const RULE_NAME: &str = "ruleName";
pub const PAGE: &str = "page";
pub const SIZE: &str = "size";
