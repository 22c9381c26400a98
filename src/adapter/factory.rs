//! Resolution of the search adapter serving an index

use super::{AdapterResolver, Fts5Adapter, NoopAdapter, SearchAdapter};
use crate::index::SearchIndex;
use crate::metadata::{BackendKind, Metadata};
use anyhow::{Context, Result};
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Creates adapters from the backend declared for each index.
///
/// FTS5 corpus files are opened once and shared by every index stored in
/// them.
pub struct BackendAdapterResolver {
    metadata: Arc<Metadata>,
    corpora: Mutex<HashMap<PathBuf, Arc<Mutex<Connection>>>>,
}

impl BackendAdapterResolver {
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self {
            metadata,
            corpora: Mutex::new(HashMap::new()),
        }
    }

    fn corpus(&self, path: &Path) -> Result<Arc<Mutex<Connection>>> {
        let mut corpora = self.corpora.lock().unwrap();
        if let Some(conn) = corpora.get(path) {
            return Ok(conn.clone());
        }
        info!("Opening FTS5 search corpus at {:?}", path);
        let conn = Fts5Adapter::open_corpus(path)?;
        corpora.insert(path.to_path_buf(), conn.clone());
        Ok(conn)
    }
}

impl AdapterResolver for BackendAdapterResolver {
    fn resolve(&self, index: &SearchIndex) -> Result<Arc<dyn SearchAdapter>> {
        let backend = self
            .metadata
            .backend(index.backend_id)
            .with_context(|| format!("Unknown backend {} for index {}", index.backend_id, index.id))?;
        let name = index
            .name
            .as_deref()
            .with_context(|| format!("Index {} has no name", index.id))?;

        match backend.kind {
            BackendKind::Fts5 => {
                let path = backend
                    .path
                    .as_ref()
                    .with_context(|| format!("Backend '{}' has no corpus path", backend.name))?;
                Ok(Arc::new(Fts5Adapter::new(self.corpus(path)?, name)?))
            }
            BackendKind::Noop => Ok(Arc::new(NoopAdapter::new(name))),
        }
    }
}
