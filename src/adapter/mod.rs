//! Search backend adapters.

mod factory;
mod fts5_adapter;
mod noop_adapter;
mod search_adapter;

pub use factory::BackendAdapterResolver;
pub use fts5_adapter::Fts5Adapter;
pub use noop_adapter::NoopAdapter;
#[cfg(feature = "mock")]
pub use search_adapter::MockSearchAdapter;
pub use search_adapter::{AdapterResolver, ExportRecord, SearchAdapter};
