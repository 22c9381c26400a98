use crate::index::SearchIndex;
use anyhow::Result;
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// A document handed to a search backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportRecord {
    pub record_id: String,
    pub payload: JsonValue,
}

/// Backend-specific access to the documents of one index.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait SearchAdapter: Send + Sync {
    /// Removes every document of the index from the backend.
    fn clear(&self) -> Result<()>;

    /// Inserts or replaces documents. Returns how many were written.
    fn export(&self, records: &[ExportRecord]) -> Result<usize>;
}

/// Finds the adapter serving an index.
pub trait AdapterResolver: Send + Sync {
    fn resolve(&self, index: &SearchIndex) -> Result<Arc<dyn SearchAdapter>>;
}
