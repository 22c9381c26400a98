use crate::export::ExportManager;
use crate::job_queue::QueueStore;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Context provided to jobs during execution.
#[derive(Clone)]
pub struct JobContext {
    /// Token to check for cancellation/shutdown requests.
    pub cancellation_token: CancellationToken,

    pub manager: Arc<ExportManager>,

    /// Worker-side access to the job queue, for housekeeping.
    pub queue: Arc<dyn QueueStore>,
}

impl JobContext {
    pub fn new(
        cancellation_token: CancellationToken,
        manager: Arc<ExportManager>,
        queue: Arc<dyn QueueStore>,
    ) -> Self {
        Self {
            cancellation_token,
            manager,
            queue,
        }
    }

    /// Same resources, different cancellation token.
    pub fn with_token(&self, cancellation_token: CancellationToken) -> Self {
        Self {
            cancellation_token,
            manager: Arc::clone(&self.manager),
            queue: Arc::clone(&self.queue),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

/// Context over in-memory stores knowing a single no-op backend, language
/// and model, all with id 1.
#[cfg(test)]
pub(crate) fn test_context(cancellation_token: CancellationToken) -> JobContext {
    use crate::adapter::BackendAdapterResolver;
    use crate::bindings::{ExporterPayload, SqliteBindingStore};
    use crate::index::{open_index_db_in_memory, SqliteIndexStore};
    use crate::job_queue::SqliteJobQueue;
    use crate::metadata::{Backend, BackendKind, Language, Metadata, ModelInfo};

    let metadata = Arc::new(Metadata {
        backends: vec![Backend {
            id: 1,
            name: "Shop".to_string(),
            kind: BackendKind::Noop,
            path: None,
        }],
        languages: vec![Language {
            id: 1,
            code: "en_US".to_string(),
            name: None,
        }],
        models: vec![ModelInfo {
            id: 1,
            model: "product.template".to_string(),
            name: Some("Product".to_string()),
            indexable: true,
            transient: false,
        }],
        exporters: vec![],
    });
    let conn = open_index_db_in_memory().unwrap();
    let queue = Arc::new(SqliteJobQueue::in_memory(1).unwrap());
    let manager = ExportManager::new(
        Arc::new(SqliteIndexStore::new(conn.clone(), metadata.clone())),
        Arc::new(SqliteBindingStore::new(conn)),
        queue.clone(),
        Arc::new(BackendAdapterResolver::new(metadata.clone())),
        Arc::new(ExporterPayload::new(metadata)),
    );
    JobContext::new(cancellation_token, Arc::new(manager), queue)
}
