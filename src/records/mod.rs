//! Record model and the pure reconciliation algorithms.
//!
//! Nothing in this module talks to the network or the file system. The sync layer loads
//! records, hands them to these functions, and submits whatever comes back.

/// CSV parsing and rendering
pub mod codec;
/// Error type for record handling
pub mod error;
/// Two-pass parent/child upload planning for accounts
pub mod hierarchy;
/// Named-field mapping tables and value coercions
pub mod mapping;
/// Set-difference joins, duplicate detection, remote lookups
pub mod matcher;
/// Whitespace normalization of join keys
pub mod normalize;
/// Record, field value and batch types
pub mod record;

pub use error::RecordError;
pub use record::{FieldValue, Record, RecordBatch, RecordKind};
