//! Full re-derivation of index contents.

use super::error::ExportError;
use crate::bindings::{BindingFilter, BindingStore, PayloadComputer, SyncState};
use crate::index::{IndexStore, SearchIndex};
use crate::job_queue::{
    JobHandle, JobPayload, JobQueue, CHANNEL_PREPARE_BATCH_EXPORT, CHANNEL_RECOMPUTE_JSON,
};
use std::sync::Arc;
use tracing::{debug, info};

/// What recomputing a binding's payload led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// Payload changed, or export was forced: the binding awaits export.
    MarkedToUpdate,
    Unchanged,
}

pub struct RecomputeCoordinator {
    indices: Arc<dyn IndexStore>,
    bindings: Arc<dyn BindingStore>,
    queue: Arc<dyn JobQueue>,
    payloads: Arc<dyn PayloadComputer>,
}

impl RecomputeCoordinator {
    pub fn new(
        indices: Arc<dyn IndexStore>,
        bindings: Arc<dyn BindingStore>,
        queue: Arc<dyn JobQueue>,
        payloads: Arc<dyn PayloadComputer>,
    ) -> Self {
        Self {
            indices,
            bindings,
            queue,
            payloads,
        }
    }

    /// Enqueues one recompute job per binding of each index.
    /// Returns the number of jobs enqueued.
    pub fn recompute_all(
        &self,
        indices: &[SearchIndex],
        force_export: bool,
    ) -> Result<usize, ExportError> {
        let mut enqueued = 0;
        for index in indices {
            let name = index.display_name();
            let bindings = self.bindings.find(&BindingFilter::of_index(index.id))?;
            for binding in &bindings {
                let description = format!(
                    "Recompute json of record '{}' for index '{}'",
                    binding.record_id, name
                );
                self.queue.enqueue(
                    CHANNEL_RECOMPUTE_JSON,
                    &description,
                    &JobPayload::RecomputeBinding {
                        binding_id: binding.id,
                        force_export,
                    },
                )?;
            }
            info!(
                "Enqueued {} recompute jobs for index '{}' (force_export: {})",
                bindings.len(),
                name,
                force_export
            );
            enqueued += bindings.len();
        }
        Ok(enqueued)
    }

    /// Computes the payload of one binding and stores it. The binding is
    /// marked `to_update` when the payload changed or `force_export` is set.
    pub fn recompute_binding(
        &self,
        binding_id: i64,
        force_export: bool,
    ) -> Result<RecomputeOutcome, ExportError> {
        let binding = self
            .bindings
            .get(binding_id)?
            .ok_or(ExportError::BindingNotFound(binding_id))?;
        let index = self
            .indices
            .get(binding.index_id)?
            .ok_or(ExportError::IndexNotFound(binding.index_id))?;

        let payload = self.payloads.compute(&index, &binding)?;
        let changed = binding.data.as_ref() != Some(&payload);
        if changed {
            self.bindings.store_payload(binding.id, &payload)?;
        }
        if !changed && !force_export {
            debug!("Payload of binding {} unchanged", binding.id);
            return Ok(RecomputeOutcome::Unchanged);
        }

        self.bindings
            .bulk_set_state(&[binding.id], SyncState::ToUpdate, false)?;
        Ok(RecomputeOutcome::MarkedToUpdate)
    }

    /// Marks every binding of the index `to_update` and enqueues the job that
    /// schedules its batch export.
    pub fn force_batch_export(&self, index: &SearchIndex) -> Result<JobHandle, ExportError> {
        let marked = self
            .bindings
            .set_state_for_index(index.id, SyncState::ToUpdate, true)?;
        info!(
            "Marked {} bindings of index '{}' for export",
            marked,
            index.display_name()
        );
        self.enqueue_prepare(index)
    }

    /// Enqueues the scheduling job of each index independently.
    pub fn generate_batch_export_per_index(
        &self,
        indices: &[SearchIndex],
    ) -> Result<Vec<JobHandle>, ExportError> {
        indices.iter().map(|index| self.enqueue_prepare(index)).collect()
    }

    fn enqueue_prepare(&self, index: &SearchIndex) -> Result<JobHandle, ExportError> {
        let description = format!(
            "Prepare a batch export of index '{}'",
            index.display_name()
        );
        let handle = self.queue.enqueue(
            CHANNEL_PREPARE_BATCH_EXPORT,
            &description,
            &JobPayload::PrepareBatchExport { index_id: index.id },
        )?;
        Ok(handle)
    }
}
