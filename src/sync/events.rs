//! Event system for reconciliation runs.
//!
//! Stages emit events as they load, match and submit records. Handlers registered with the
//! `EventDispatcher` receive every event, which keeps reporting out of the stage logic.

use crate::sync::types::{JobReport, SyncError};
use tracing::{info, warn};

/// Events that occur during a reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// A stage began
    StageStarted { stage: &'static str },
    /// Local rows with no remote counterpart were found
    UnmatchedFound { stage: &'static str, count: usize },
    /// Local rows were left out of the upload
    RowsDropped {
        stage: &'static str,
        reason: &'static str,
        count: usize,
    },
    /// An ingest job finished, or was skipped because its batch was empty
    JobFinished {
        stage: &'static str,
        report: JobReport,
    },
    /// A stage finished without error
    StageCompleted { stage: &'static str },
}

impl SyncEvent {
    pub fn stage(&self) -> &'static str {
        match self {
            SyncEvent::StageStarted { stage }
            | SyncEvent::UnmatchedFound { stage, .. }
            | SyncEvent::RowsDropped { stage, .. }
            | SyncEvent::JobFinished { stage, .. }
            | SyncEvent::StageCompleted { stage } => *stage,
        }
    }
}

/// Trait for handling sync events.
///
/// Implementors receive all sync events and can perform side effects or state updates.
#[async_trait::async_trait]
pub trait SyncEventHandler: Send + Sync {
    /// Handle a sync event.
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError>;

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Event dispatcher that manages multiple event handlers.
///
/// Handlers are called in registration order for every event.
#[derive(Default)]
pub struct EventDispatcher {
    handlers: Vec<Box<dyn SyncEventHandler>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    /// Register a new event handler.
    pub fn register_handler(&mut self, handler: Box<dyn SyncEventHandler>) {
        self.handlers.push(handler);
    }

    /// Dispatch an event to all registered handlers.
    ///
    /// Errors from handlers are logged, but do not stop other handlers from running.
    pub async fn dispatch(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
        for handler in &mut self.handlers {
            if let Err(e) = handler.handle(event).await {
                tracing::error!("Handler {} failed to process event: {}", handler.name(), e);
            }
        }
        Ok(())
    }
}

/// Writes a log line for every event
pub struct LoggingEventHandler;

#[async_trait::async_trait]
impl SyncEventHandler for LoggingEventHandler {
    async fn handle(&mut self, event: &SyncEvent) -> Result<(), SyncError> {
        match event {
            SyncEvent::StageStarted { stage } => info!("Syncing {}...", stage),
            SyncEvent::UnmatchedFound { stage, count } => {
                info!("{}: {} local records not found remotely", stage, count)
            }
            SyncEvent::RowsDropped {
                stage,
                reason,
                count,
            } => warn!("{}: left out {} records ({})", stage, count, reason),
            SyncEvent::JobFinished { stage, report } if report.is_skipped() => {
                info!("{}: nothing to {} on {}", stage, report.operation, report.object)
            }
            SyncEvent::JobFinished { stage, report } => {
                if report.failed > 0 {
                    warn!(
                        "{}: {} of {} {} records failed",
                        stage, report.failed, report.submitted, report.object
                    );
                } else {
                    info!(
                        "{}: {} {} records processed",
                        stage, report.processed, report.object
                    );
                }
            }
            SyncEvent::StageCompleted { stage } => info!("{} sync complete", stage),
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingEventHandler"
    }
}
