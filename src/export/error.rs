use crate::index::IndexConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Batch size of index '{index}' must be a positive integer, got {batch_size}")]
    InvalidBatchSize { index: String, batch_size: i64 },

    #[error("Index {0} not found")]
    IndexNotFound(i64),

    #[error("Binding {0} not found")]
    BindingNotFound(i64),

    #[error("Failed to enqueue batch {batch} of index '{index}': {cause:#}")]
    Enqueue {
        index: String,
        batch: usize,
        cause: anyhow::Error,
    },

    #[error("Failed to mark batch {batch} of index '{index}' as scheduled: {cause:#}")]
    MarkScheduled {
        index: String,
        batch: usize,
        cause: anyhow::Error,
    },

    #[error("Search backend of index '{index}' failed: {cause:#}")]
    Adapter { index: String, cause: anyhow::Error },

    #[error(transparent)]
    Config(#[from] IndexConfigError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
