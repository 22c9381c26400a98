use thiserror::Error;

/// Rejected index configuration.
#[derive(Debug, Error)]
pub enum IndexConfigError {
    #[error("Lang and model of index must be uniq per backend.")]
    DuplicateIndex {
        backend_id: i64,
        lang_id: i64,
        model_id: i64,
    },

    #[error("Batch size must be a positive integer, got {0}")]
    InvalidBatchSize(i64),

    #[error("Unknown backend {0}")]
    UnknownBackend(i64),

    #[error("Unknown language {0}")]
    UnknownLanguage(i64),

    #[error("Unknown model {0}")]
    UnknownModel(i64),

    #[error("Unknown exporter {0}")]
    UnknownExporter(i64),

    #[error("Model '{0}' cannot be indexed")]
    ModelNotIndexable(String),

    #[error("Exporter '{exporter}' does not export model '{model}'")]
    ExporterModelMismatch { exporter: String, model: String },

    #[error("Index {0} not found")]
    NotFound(i64),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
