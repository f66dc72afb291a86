//! Sync orchestrator.
//!
//! The `SyncOrchestrator` runs the reconciliation stages in a fixed order (donors, partners,
//! volunteers, rescues) against one remote store and one set of local exports. Each stage sees
//! the results of the previous ones, because account and contact IDs are re-read from the
//! remote store when a later stage needs them.
//!
//! The orchestrator owns the event dispatcher. A fresh progress tracker is created for every
//! run, and its `SyncStats` are returned to the caller.

use crate::sync::driver::RemoteStore;
use crate::sync::events::{EventDispatcher, LoggingEventHandler};
use crate::sync::progress_tracker::{SyncProgressTracker, SyncStats};
use crate::sync::repositories::LocalRecordRepository;
use crate::sync::stages::{
    AccountStage, RescueStage, SyncContext, SyncSettings, SyncStage, VolunteerStage,
};
use crate::sync::types::SyncError;
use tracing::info;

/// Runs every reconciliation stage in order
pub struct SyncOrchestrator<'a> {
    remote: &'a dyn RemoteStore,
    local: &'a dyn LocalRecordRepository,
    settings: SyncSettings,
    stages: Vec<Box<dyn SyncStage>>,
    event_dispatcher: EventDispatcher,
}

impl<'a> SyncOrchestrator<'a> {
    /// Create an orchestrator with the standard stage sequence and a logging handler.
    pub fn new(
        remote: &'a dyn RemoteStore,
        local: &'a dyn LocalRecordRepository,
        settings: SyncSettings,
    ) -> Self {
        let mut event_dispatcher = EventDispatcher::new();
        event_dispatcher.register_handler(Box::new(LoggingEventHandler));

        Self {
            remote,
            local,
            settings,
            stages: vec![
                Box::new(AccountStage::donors()),
                Box::new(AccountStage::partners()),
                Box::new(VolunteerStage),
                Box::new(RescueStage),
            ],
            event_dispatcher,
        }
    }

    /// Register an additional event handler
    #[cfg(test)]
    pub fn register_handler(&mut self, handler: Box<dyn crate::sync::events::SyncEventHandler>) {
        self.event_dispatcher.register_handler(handler);
    }

    #[cfg(test)]
    fn push_stage(&mut self, stage: Box<dyn SyncStage>) {
        self.stages.push(stage);
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Run all stages. The first error stops the run; stages that already finished are not
    /// rolled back, and a re-run picks up from whatever the remote store holds.
    pub async fn sync(&mut self) -> Result<SyncStats, SyncError> {
        info!(
            "Starting reconciliation: {}",
            self.stage_names().join(" -> ")
        );

        let mut progress_tracker = SyncProgressTracker::new();
        let mut ctx = SyncContext::new(
            self.remote,
            self.local,
            &self.settings,
            &mut self.event_dispatcher,
            &mut progress_tracker,
        );

        for stage in &self.stages {
            stage.run(&mut ctx).await?;
        }

        progress_tracker
            .validate_completion()
            .map_err(SyncError::IncompleteRun)?;
        let stats = progress_tracker.get_stats();
        info!("{}", stats.summary());
        Ok(stats)
    }
}
