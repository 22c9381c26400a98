//! Search export scheduler library.
//!
//! Keeps search indices in sync with their records: bindings marked for
//! update are sliced into batches and exported through a persistent job
//! queue.

pub mod adapter;
pub mod app;
pub mod background_jobs;
pub mod bindings;
pub mod config;
pub mod export;
pub mod index;
pub mod job_queue;
pub mod metadata;
pub mod metrics;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use app::App;
pub use export::{ExportError, ExportManager};
pub use index::{IndexConfigError, SearchIndex};
