//! CloudRec API - console data model
//!
//! This crate provides:
//! - The response envelope and pagination wrappers
//! - Whited rule records, lock status projection and aggregate groups
//! - Subscription notification actions
//! - Input validation utilities

pub mod model;
pub mod subscription;
pub mod validation;
pub mod whited;

// Re-export commonly used types
pub use model::*;
pub use subscription::{ActionFields, ActionItem, ActionType, NotifyChannel, SubmittedAction};
pub use whited::{
    AggregateGroup, GroupQuery, LockStatus, RecordQuery, RuleConfigItem, RuleRecord, RuleType,
    SaveRuleRecord, WhitedOperator,
};
