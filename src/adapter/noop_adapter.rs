use super::{ExportRecord, SearchAdapter};
use anyhow::Result;
use tracing::debug;

/// Adapter for backends with search disabled. Accepts every document.
pub struct NoopAdapter {
    index_name: String,
}

impl NoopAdapter {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
        }
    }
}

impl SearchAdapter for NoopAdapter {
    fn clear(&self) -> Result<()> {
        debug!("Noop clear of index '{}'", self.index_name);
        Ok(())
    }

    fn export(&self, records: &[ExportRecord]) -> Result<usize> {
        debug!(
            "Noop export of {} records to index '{}'",
            records.len(),
            self.index_name
        );
        Ok(records.len())
    }
}
