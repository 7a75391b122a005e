//! CloudRec Core - reference whited rule store
//!
//! This crate provides:
//! - `LockService`: per-record edit leases with grab or exclusive acquisition
//! - `MemoryRuleStore`: an in-process store that upholds the backend lock
//!   invariants, and `CallerSession` handles that evaluate every operation
//!   relative to one caller

pub mod lock;
pub mod store;

pub use lock::{LockHolder, LockPolicy, LockService};
pub use store::{Caller, CallerSession, MemoryRuleStore};
