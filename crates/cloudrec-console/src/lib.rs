//! CloudRec Console - operator console for whited rules
//!
//! This crate provides:
//! - Store abstraction over a remote CloudRec server or an in-process store
//! - Lock coordination and the mutation gateway that enforces it
//! - Rule-code aggregation and drill-down
//! - Subscription action list editing
//! - Configuration and logging setup for the `cloudrec-console` binary

pub mod actions;
pub mod aggregate;
pub mod config;
pub mod datasource;
pub mod gateway;
pub mod lock;
pub mod logging;

pub use actions::ActionListEditor;
pub use aggregate::{NavigationIntent, RuleAggregator, RuleCodeOption, normalize_groups};
pub use config::{ConfigOverrides, ConsoleConfig};
pub use datasource::{RuleRecordStore, create_store};
pub use gateway::MutationGateway;
pub use lock::{LockCoordinator, ViewMode};
pub use logging::{LoggingConfig, init_logging};
