//! Reconciliation module
//!
//! This module drives the reconciliation between the admin-tool exports and the CRM:
//!
//! - `driver`: runs bulk query and ingest jobs to completion behind the `RemoteStore` trait.
//! - `poll`: bounded polling with a fixed delay.
//! - `repositories`: loads the local CSV exports.
//! - `stages`: one stage per record type, plus the `SyncContext` they share.
//! - `orchestrator`: runs the stages in order and returns the run's statistics.
//! - `events` and `progress_tracker`: decoupled reporting of what each stage did.
//! - `tools`: duplicate finders, overdue rescues, discrepancy reports, comment backfill.

/// Bulk job driver and the `RemoteStore` seam
pub mod driver;
/// Event system for decoupled reporting during a run
pub mod events;
/// Main coordinator for a reconciliation run
pub mod orchestrator;
/// Fixed-delay polling
pub mod poll;
/// Tracks per-stage counts and statistics
pub mod progress_tracker;
/// Local export loading
pub mod repositories;
/// Per-record-type reconciliation stages
pub mod stages;
/// Maintenance reports and fixes
pub mod tools;
/// Error and report types
pub mod types;

#[cfg(test)]
mod testing;

pub use driver::BulkJobDriver;
pub use orchestrator::SyncOrchestrator;
pub use poll::PollSettings;
pub use repositories::FileRecordRepository;
pub use stages::SyncSettings;
pub use tools::{DiscrepancyDirection, MaintenanceTools};
pub use types::*;
