//! Progress tracking for reconciliation runs.
//!
//! The tracker folds the event stream into per-stage counters. The orchestrator hands the
//! collected `SyncStats` back to the caller when the run finishes.

use crate::sync::events::SyncEvent;
use tracing::{info, warn};

/// Counters for one stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageProgress {
    pub stage: &'static str,
    /// Local rows with no remote counterpart
    pub unmatched: usize,
    /// Rows left out of the upload (placeholder weights, inactive states, missing parents)
    pub dropped: usize,
    /// Ingest jobs actually submitted
    pub jobs: usize,
    /// Rows sent across all jobs
    pub submitted: usize,
    pub processed: u64,
    pub failed: u64,
    pub completed: bool,
}

/// Service for tracking reconciliation progress
#[derive(Debug, Clone, Default)]
pub struct SyncProgressTracker {
    /// Stages in the order they started
    stages: Vec<StageProgress>,
}

impl SyncProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage_mut(&mut self, stage: &'static str) -> &mut StageProgress {
        let position = match self.stages.iter().position(|s| s.stage == stage) {
            Some(position) => position,
            None => {
                self.stages.push(StageProgress {
                    stage,
                    ..Default::default()
                });
                self.stages.len() - 1
            }
        };
        &mut self.stages[position]
    }

    /// Fold one event into the counters
    pub fn record_event(&mut self, event: &SyncEvent) {
        let progress = self.stage_mut(event.stage());
        match event {
            SyncEvent::StageStarted { .. } => {}
            SyncEvent::UnmatchedFound { count, .. } => progress.unmatched += count,
            SyncEvent::RowsDropped { count, .. } => progress.dropped += count,
            SyncEvent::JobFinished { report, .. } => {
                if !report.is_skipped() {
                    progress.jobs += 1;
                    progress.submitted += report.submitted;
                    progress.processed += report.processed;
                    progress.failed += report.failed;
                }
            }
            SyncEvent::StageCompleted { .. } => progress.completed = true,
        }
    }

    /// Get sync statistics as a SyncStats struct
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            stages: self.stages.clone(),
        }
    }

    /// Validate that every started stage completed
    pub fn validate_completion(&self) -> Result<(), String> {
        let incomplete: Vec<&str> = self
            .stages
            .iter()
            .filter(|s| !s.completed)
            .map(|s| s.stage)
            .collect();
        if !incomplete.is_empty() {
            return Err(format!("Stages did not complete: {}", incomplete.join(", ")));
        }

        let failed: u64 = self.stages.iter().map(|s| s.failed).sum();
        if failed > 0 {
            warn!("Run finished with {} records rejected by the remote store", failed);
        }
        info!("All {} stages completed", self.stages.len());
        Ok(())
    }
}

/// Sync statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    pub stages: Vec<StageProgress>,
}

impl SyncStats {
    #[cfg(test)]
    pub fn stage(&self, name: &str) -> Option<&StageProgress> {
        self.stages.iter().find(|s| s.stage == name)
    }

    pub fn total_submitted(&self) -> usize {
        self.stages.iter().map(|s| s.submitted).sum()
    }

    pub fn total_failed(&self) -> u64 {
        self.stages.iter().map(|s| s.failed).sum()
    }

    /// Get a summary string of the sync statistics
    pub fn summary(&self) -> String {
        let per_stage: Vec<String> = self
            .stages
            .iter()
            .map(|s| {
                format!(
                    "{}: {} unmatched, {} dropped, {} uploaded in {} jobs, {} processed, {} failed",
                    s.stage, s.unmatched, s.dropped, s.submitted, s.jobs, s.processed, s.failed
                )
            })
            .collect();
        format!(
            "Uploaded {} records, {} failed. {}",
            self.total_submitted(),
            self.total_failed(),
            per_stage.join("; ")
        )
    }
}
