//! Bindings: the per-index export state of business records.

mod import;
mod models;
mod payload;
mod schema;
mod store;

pub use import::read_jsonl;
pub use models::{Binding, BindingFilter, BindingRef, NewBinding, StateCounts, SyncState};
pub use payload::{ExporterPayload, PayloadComputer};
pub(crate) use schema::SE_BINDING_TABLE_V1;
pub use store::{BindingChangeListener, BindingStore, SqliteBindingStore};
