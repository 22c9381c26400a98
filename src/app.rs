//! Wiring of stores, adapters and the export manager over the configured
//! databases.

use crate::adapter::BackendAdapterResolver;
use crate::bindings::{BindingChangeListener, ExporterPayload, SqliteBindingStore};
use crate::config::AppConfig;
use crate::export::{ExportJobExecutor, ExportManager};
use crate::index::{open_index_db, IndexStore, SearchIndex, SqliteIndexStore};
use crate::job_queue::{SqliteJobQueue, WorkerPool};
use crate::metadata::Metadata;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info};

pub struct App {
    pub config: AppConfig,
    pub metadata: Arc<Metadata>,
    pub indices: Arc<SqliteIndexStore>,
    pub bindings: Arc<SqliteBindingStore>,
    pub queue: Arc<SqliteJobQueue>,
    pub manager: Arc<ExportManager>,
}

impl App {
    /// Opens both databases. `listener` is told about bindings marked for
    /// export outside of the export machinery.
    pub fn open(
        config: AppConfig,
        listener: Option<Arc<dyn BindingChangeListener>>,
    ) -> Result<Self> {
        let metadata = Arc::new(config.metadata.clone());

        info!("Opening index database at {:?}...", config.index_db_path());
        let conn = open_index_db(&config.index_db_path())
            .with_context(|| format!("Failed to open {:?}", config.index_db_path()))?;
        let indices = Arc::new(SqliteIndexStore::new(conn.clone(), metadata.clone()));
        let mut bindings = SqliteBindingStore::new(conn);
        if let Some(listener) = listener {
            bindings = bindings.with_listener(listener);
        }
        let bindings = Arc::new(bindings);

        info!("Opening job queue at {:?}...", config.jobs_db_path());
        let queue = Arc::new(
            SqliteJobQueue::new(config.jobs_db_path(), config.worker.max_retries)
                .with_context(|| format!("Failed to open {:?}", config.jobs_db_path()))?,
        );

        let manager = Arc::new(ExportManager::new(
            indices.clone(),
            bindings.clone(),
            queue.clone(),
            Arc::new(BackendAdapterResolver::new(metadata.clone())),
            Arc::new(ExporterPayload::new(metadata.clone())),
        ));

        Ok(Self {
            config,
            metadata,
            indices,
            bindings,
            queue,
            manager,
        })
    }

    /// Refreshes stored names against the current metadata and creates the
    /// declared indices that do not exist yet.
    ///
    /// A renamed index is cleared under its previous name on the search
    /// backend and scheduled for a full export under the new one.
    pub fn sync_indices(&self) -> Result<Vec<SearchIndex>> {
        for rename in self.indices.refresh_names()? {
            if let Err(e) = self.manager.move_renamed_index(&rename) {
                error!(
                    "Failed to move index {} to its new name: {}",
                    rename.index.id, e
                );
            }
        }

        let mut declared = Vec::with_capacity(self.config.indices.len());
        for new_index in &self.config.indices {
            declared.push(self.indices.ensure(new_index.clone())?);
        }
        Ok(declared)
    }

    pub fn worker_pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.queue.clone(),
            Arc::new(ExportJobExecutor::new(self.manager.clone())),
            self.config.worker.clone(),
        )
    }
}
