//! Periodic sweep turning pending bindings into batch exports.
//!
//! Enqueues one deferred batch export per index holding bindings in
//! `to_update`. Runs on an interval and whenever bindings get marked.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, HookEvent, JobError, JobSchedule},
};
use crate::index::IndexFilter;
use std::time::Duration;
use tracing::{debug, info};

pub struct BatchExportSweepJob {
    interval: Duration,
}

impl BatchExportSweepJob {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }
}

impl BackgroundJob for BatchExportSweepJob {
    fn id(&self) -> &'static str {
        "batch_export_sweep"
    }

    fn description(&self) -> &'static str {
        "Schedule batch exports for indices with bindings to update"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Combined {
            interval: Some(self.interval),
            hooks: vec![HookEvent::OnBindingsChanged],
        }
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let indices = ctx
            .manager
            .indices()
            .find(&IndexFilter::all())
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        let mut pending = Vec::new();
        for index in &indices {
            let counts = ctx
                .manager
                .bindings()
                .state_counts(index.id)
                .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
            if counts.to_update > 0 {
                debug!(
                    "Index '{}' has {} bindings to update",
                    index.display_name(),
                    counts.to_update
                );
                pending.push(index.id);
            }
        }

        if pending.is_empty() {
            debug!("No index has bindings to update");
            return Ok(());
        }

        let handles = ctx
            .manager
            .generate_batch_export_per_index(&IndexFilter {
                ids: Some(pending),
                ..Default::default()
            })
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;
        info!("Enqueued batch export preparation for {} indices", handles.len());
        Ok(())
    }
}
