//! CloudRec Client - HTTP access to the whited rule store
//!
//! This crate provides:
//! - HTTP client with token authentication, retry, and failover
//! - API client with typed methods for the whited rule endpoints

pub mod api;
pub mod error;
pub mod http;

pub use api::WhitedRuleApiClient;
pub use error::ClientError;
pub use http::{CloudRecHttpClient, HttpClientConfig};
