use super::error::ExportError;
use crate::adapter::AdapterResolver;
use crate::index::SearchIndex;
use tracing::info;

/// Removes every document of `index` from its search backend.
///
/// Binding states are left untouched.
pub fn clear_index(adapters: &dyn AdapterResolver, index: &SearchIndex) -> Result<(), ExportError> {
    let name = index.display_name();
    let adapter = adapters
        .resolve(index)
        .map_err(|cause| ExportError::Adapter {
            index: name.clone(),
            cause,
        })?;
    adapter.clear().map_err(|cause| ExportError::Adapter {
        index: name.clone(),
        cause,
    })?;
    info!("Cleared index '{}'", name);
    Ok(())
}
