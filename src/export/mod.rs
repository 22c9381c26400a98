//! Batch export scheduling, recomputation and clearing of indices.

mod batch;
mod clear;
mod error;
mod executor;
mod manager;
mod recompute;

pub use batch::{BatchExportSummary, BatchScheduler};
pub use clear::clear_index;
pub use error::ExportError;
pub use executor::ExportJobExecutor;
pub use manager::ExportManager;
pub use recompute::{RecomputeCoordinator, RecomputeOutcome};
