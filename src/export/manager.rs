use super::batch::{BatchExportSummary, BatchScheduler};
use super::clear::clear_index;
use super::error::ExportError;
use super::recompute::{RecomputeCoordinator, RecomputeOutcome};
use crate::adapter::{AdapterResolver, ExportRecord};
use crate::bindings::{BindingStore, PayloadComputer, SyncState};
use crate::index::{IndexFilter, IndexRename, IndexStore, SearchIndex};
use crate::job_queue::{JobHandle, JobQueue};
use crate::metrics;
use std::sync::Arc;
use tracing::{info, warn};

/// Entry point for every export operation, shared by the CLI, the job
/// executor and the background jobs.
pub struct ExportManager {
    indices: Arc<dyn IndexStore>,
    bindings: Arc<dyn BindingStore>,
    adapters: Arc<dyn AdapterResolver>,
    payloads: Arc<dyn PayloadComputer>,
    scheduler: BatchScheduler,
    recompute: RecomputeCoordinator,
}

impl ExportManager {
    pub fn new(
        indices: Arc<dyn IndexStore>,
        bindings: Arc<dyn BindingStore>,
        queue: Arc<dyn JobQueue>,
        adapters: Arc<dyn AdapterResolver>,
        payloads: Arc<dyn PayloadComputer>,
    ) -> Self {
        Self {
            scheduler: BatchScheduler::new(bindings.clone(), queue.clone()),
            recompute: RecomputeCoordinator::new(
                indices.clone(),
                bindings.clone(),
                queue,
                payloads.clone(),
            ),
            indices,
            bindings,
            adapters,
            payloads,
        }
    }

    pub fn indices(&self) -> &Arc<dyn IndexStore> {
        &self.indices
    }

    pub fn bindings(&self) -> &Arc<dyn BindingStore> {
        &self.bindings
    }

    pub fn get_index(&self, index_id: i64) -> Result<SearchIndex, ExportError> {
        self.indices
            .get(index_id)?
            .ok_or(ExportError::IndexNotFound(index_id))
    }

    /// Slices the pending bindings of an index into export jobs, inline.
    pub fn schedule_batch_export(&self, index_id: i64) -> Result<BatchExportSummary, ExportError> {
        let index = self.get_index(index_id)?;
        self.scheduler.schedule_batch_export(&index)
    }

    /// Enqueues a deferred batch export for every index matching `filter`.
    pub fn generate_batch_export_per_index(
        &self,
        filter: &IndexFilter,
    ) -> Result<Vec<JobHandle>, ExportError> {
        let indices = self.indices.find(filter)?;
        self.recompute.generate_batch_export_per_index(&indices)
    }

    /// Enqueues a payload recomputation for every binding of the indices
    /// matching `filter`.
    pub fn recompute_all_index(
        &self,
        filter: &IndexFilter,
        force_export: bool,
    ) -> Result<usize, ExportError> {
        let indices = self.indices.find(filter)?;
        self.recompute.recompute_all(&indices, force_export)
    }

    pub fn force_recompute_all(&self, filter: &IndexFilter) -> Result<usize, ExportError> {
        self.recompute_all_index(filter, true)
    }

    pub fn recompute_binding(
        &self,
        binding_id: i64,
        force_export: bool,
    ) -> Result<RecomputeOutcome, ExportError> {
        self.recompute.recompute_binding(binding_id, force_export)
    }

    pub fn force_batch_export(&self, index_id: i64) -> Result<JobHandle, ExportError> {
        let index = self.get_index(index_id)?;
        self.recompute.force_batch_export(&index)
    }

    pub fn clear_index(&self, index_id: i64) -> Result<(), ExportError> {
        let index = self.get_index(index_id)?;
        clear_index(self.adapters.as_ref(), &index)
    }

    /// Follows a name change on the search backend: documents stored under
    /// the previous name are removed and the whole index is exported again
    /// under the new one.
    pub fn move_renamed_index(&self, rename: &IndexRename) -> Result<Option<JobHandle>, ExportError> {
        let index = &rename.index;
        warn!(
            "Index {} renamed from '{}' to '{}', exporting it again",
            index.id,
            rename.previous().display_name(),
            index.display_name()
        );
        if rename.previous_name.is_some() {
            clear_index(self.adapters.as_ref(), &rename.previous())?;
        }
        if index.name.is_none() {
            return Ok(None);
        }
        self.recompute.force_batch_export(index).map(Some)
    }

    /// Sends a batch to the search backend and marks it `done`.
    ///
    /// Payloads are computed from the current sources and stored when they
    /// differ. Only bindings still `scheduled` are marked, so a record that
    /// changed during the export stays `to_update`. Returns the number of
    /// documents the backend accepted.
    pub fn export_batch(&self, index_id: i64, binding_ids: &[i64]) -> Result<usize, ExportError> {
        let index = self.get_index(index_id)?;
        self.scheduler.wait_for_scheduling(index_id);
        let name = index.display_name();
        let bindings = self.bindings.get_many(binding_ids)?;

        let mut records = Vec::with_capacity(bindings.len());
        for binding in &bindings {
            let payload = self.payloads.compute(&index, binding)?;
            if binding.data.as_ref() != Some(&payload) {
                self.bindings.store_payload(binding.id, &payload)?;
            }
            records.push(ExportRecord {
                record_id: binding.record_id.clone(),
                payload,
            });
        }

        let adapter = self
            .adapters
            .resolve(&index)
            .map_err(|cause| ExportError::Adapter {
                index: name.clone(),
                cause,
            })?;
        let exported = adapter
            .export(&records)
            .map_err(|cause| ExportError::Adapter {
                index: name.clone(),
                cause,
            })?;

        let ids: Vec<i64> = bindings.iter().map(|b| b.id).collect();
        self.bindings
            .transition_state(&ids, SyncState::Scheduled, SyncState::Done, true)?;
        metrics::record_bindings_exported(exported);
        info!("Exported {} records to index '{}'", exported, name);
        Ok(exported)
    }

    /// Marks the bindings of a batch the queue gave up on as `error`.
    /// Bindings changed since they were scheduled keep their new state.
    pub fn mark_batch_failed(&self, binding_ids: &[i64]) -> Result<usize, ExportError> {
        let marked = self.bindings.transition_state(
            binding_ids,
            SyncState::Scheduled,
            SyncState::Error,
            true,
        )?;
        warn!("Marked {} bindings as failed to export", marked);
        Ok(marked)
    }
}
