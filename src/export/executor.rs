use super::error::ExportError;
use super::manager::ExportManager;
use crate::background_jobs::JobError;
use crate::job_queue::{JobExecutor, JobPayload, QueuedJob};
use std::sync::Arc;
use tracing::error;

/// Runs queued export work against the export manager.
pub struct ExportJobExecutor {
    manager: Arc<ExportManager>,
}

impl ExportJobExecutor {
    pub fn new(manager: Arc<ExportManager>) -> Self {
        Self { manager }
    }

    fn to_job_error(err: ExportError) -> JobError {
        match err {
            // Retrying cannot fix these
            ExportError::IndexNotFound(_)
            | ExportError::BindingNotFound(_)
            | ExportError::InvalidBatchSize { .. }
            | ExportError::Config(_) => JobError::Permanent(err.to_string()),
            _ => JobError::ExecutionFailed(err.to_string()),
        }
    }
}

impl JobExecutor for ExportJobExecutor {
    fn execute(&self, job: &QueuedJob) -> Result<(), JobError> {
        let result = match &job.payload {
            JobPayload::PrepareBatchExport { index_id } => self
                .manager
                .schedule_batch_export(*index_id)
                .map(|_| ()),
            JobPayload::ExportBatch {
                index_id,
                binding_ids,
            } => self.manager.export_batch(*index_id, binding_ids).map(|_| ()),
            JobPayload::RecomputeBinding {
                binding_id,
                force_export,
            } => self
                .manager
                .recompute_binding(*binding_id, *force_export)
                .map(|_| ()),
        };
        result.map_err(Self::to_job_error)
    }

    fn on_failed(&self, job: &QueuedJob, _error: &JobError) {
        if let JobPayload::ExportBatch { binding_ids, .. } = &job.payload {
            if let Err(e) = self.manager.mark_batch_failed(binding_ids) {
                error!("Failed to mark bindings of job {} as failed: {}", job.uuid, e);
            }
        }
    }
}
