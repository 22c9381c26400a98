//! Search indices: one per backend, language and model.

mod error;
pub mod form;
mod models;
pub mod naming;
mod schema;
mod store;

pub use error::IndexConfigError;
pub use models::{
    IndexFilter, IndexRename, IndexUpdate, NewIndex, SearchIndex, DEFAULT_BATCH_SIZE,
};
pub use store::{open_index_db, open_index_db_in_memory, IndexStore, SqliteIndexStore};
