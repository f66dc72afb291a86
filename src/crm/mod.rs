//! CRM integration module
//!
//! This module provides the session bootstrap, the bulk API 2.0 client and the control-message
//! types used to create, feed, close and poll bulk jobs against the CRM's object store.

/// Session bootstrap (bearer token or OAuth2 password grant)
pub mod auth;
/// HTTP client for bulk query and ingest jobs
mod client;
/// Type definitions for bulk API control messages
mod types;

pub use auth::{Credentials, authenticate};
pub use client::{BulkApi, BulkApiClient};
pub use types::*;
