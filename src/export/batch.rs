//! Slicing of an index's pending bindings into export jobs.

use super::error::ExportError;
use crate::bindings::{BindingFilter, BindingStore, SyncState};
use crate::index::SearchIndex;
use crate::job_queue::{JobHandle, JobPayload, JobQueue, CHANNEL_EXPORT};
use crate::metrics;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// Outcome of one scheduling pass over an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchExportSummary {
    pub index_id: i64,
    /// Bindings that were pending export.
    pub total: usize,
    /// One job per batch, in slice order.
    pub jobs: Vec<JobHandle>,
}

pub struct BatchScheduler {
    bindings: Arc<dyn BindingStore>,
    queue: Arc<dyn JobQueue>,
    index_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl BatchScheduler {
    pub fn new(bindings: Arc<dyn BindingStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self {
            bindings,
            queue,
            index_locks: Mutex::new(HashMap::new()),
        }
    }

    fn index_lock(&self, index_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.index_locks.lock().unwrap();
        locks.entry(index_id).or_default().clone()
    }

    /// Blocks until no scheduling pass is running for the index.
    ///
    /// Export jobs call this so they never mark a slice before it was marked
    /// `scheduled`.
    pub fn wait_for_scheduling(&self, index_id: i64) {
        let lock = self.index_lock(index_id);
        let _guard = lock.lock().unwrap();
    }

    /// Enqueues one export job per `batch_size` slice of the bindings of
    /// `index` waiting for export, marking each slice `scheduled` right after
    /// its job is accepted.
    ///
    /// Calls for the same index are serialized within the process. The call
    /// returns as soon as every slice is enqueued and marked.
    pub fn schedule_batch_export(
        &self,
        index: &SearchIndex,
    ) -> Result<BatchExportSummary, ExportError> {
        let batch_size = index.batch_size;
        let name = index.display_name();
        if batch_size <= 0 {
            return Err(ExportError::InvalidBatchSize {
                index: name,
                batch_size,
            });
        }

        let lock = self.index_lock(index.id);
        let _guard = lock.lock().unwrap();

        let ids: Vec<i64> = self
            .bindings
            .find(&BindingFilter::to_export(index.id))?
            .into_iter()
            .map(|b| b.id)
            .collect();
        let total = ids.len();
        let mut summary = BatchExportSummary {
            index_id: index.id,
            total,
            jobs: Vec::with_capacity(total.div_ceil(batch_size as usize)),
        };
        if total == 0 {
            debug!("Nothing to export for index '{}'", name);
            return Ok(summary);
        }

        for (batch, slice) in ids.chunks(batch_size as usize).enumerate() {
            let description = format!(
                "Export {} records of {} for index '{}'",
                slice.len(),
                total,
                name
            );
            let payload = JobPayload::ExportBatch {
                index_id: index.id,
                binding_ids: slice.to_vec(),
            };

            let handle = self
                .queue
                .enqueue(CHANNEL_EXPORT, &description, &payload)
                .map_err(|cause| ExportError::Enqueue {
                    index: name.clone(),
                    batch,
                    cause,
                })?;

            if let Err(cause) =
                self.bindings
                    .transition_state(slice, SyncState::ToUpdate, SyncState::Scheduled, true)
            {
                if let Err(e) = self.queue.cancel(&handle) {
                    error!(
                        "Failed to cancel job {} after marking batch {} of index '{}' failed: {}",
                        handle.uuid, batch, name, e
                    );
                }
                return Err(ExportError::MarkScheduled {
                    index: name,
                    batch,
                    cause,
                });
            }

            debug!("{} (job {})", description, handle.uuid);
            metrics::record_batch_enqueued(&name, slice.len());
            summary.jobs.push(handle);
        }

        info!(
            "Scheduled {} records of index '{}' in {} batches",
            total,
            name,
            summary.jobs.len()
        );
        Ok(summary)
    }
}
