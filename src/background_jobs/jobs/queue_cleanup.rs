//! Deletes finished queue jobs past the retention period.

use crate::background_jobs::{
    context::JobContext,
    job::{BackgroundJob, JobError, JobSchedule},
};
use std::time::Duration;
use tracing::info;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

pub struct QueueCleanupJob {
    retention_days: u64,
}

impl QueueCleanupJob {
    pub fn new(retention_days: u64) -> Self {
        Self { retention_days }
    }

    fn cutoff(&self, now: i64) -> i64 {
        now - self.retention_days as i64 * SECS_PER_DAY
    }
}

impl BackgroundJob for QueueCleanupJob {
    fn id(&self) -> &'static str {
        "queue_cleanup"
    }

    fn description(&self) -> &'static str {
        "Delete done and cancelled queue jobs older than the retention period"
    }

    fn schedule(&self) -> JobSchedule {
        JobSchedule::Interval(Duration::from_secs(SECS_PER_DAY as u64))
    }

    fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        if ctx.is_cancelled() {
            return Err(JobError::Cancelled);
        }

        let cutoff = self.cutoff(chrono::Utc::now().timestamp());
        let deleted = ctx
            .queue
            .cleanup(cutoff)
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if deleted > 0 {
            info!(
                "Deleted {} queue jobs older than {} days",
                deleted, self.retention_days
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_jobs::context::test_context;
    use crate::job_queue::{JobPayload, JobQueue, CHANNEL_EXPORT};
    use tokio_util::sync::CancellationToken;

    #[test]
    fn test_cutoff() {
        let job = QueueCleanupJob::new(90);
        assert_eq!(job.cutoff(1_700_000_000), 1_700_000_000 - 7_776_000);
    }

    #[test]
    fn test_recent_jobs_are_kept() {
        let ctx = test_context(CancellationToken::new());
        let handle = ctx
            .queue
            .enqueue(CHANNEL_EXPORT, "job", &JobPayload::PrepareBatchExport { index_id: 1 })
            .unwrap();
        ctx.queue.mark_done(&handle.uuid).unwrap();

        QueueCleanupJob::new(7).execute(&ctx).unwrap();
        assert!(ctx.queue.get(&handle.uuid).unwrap().is_some());
    }
}
