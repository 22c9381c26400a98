//! Background job implementations.

pub mod batch_export_sweep;
pub mod queue_cleanup;

pub use batch_export_sweep::BatchExportSweepJob;
pub use queue_cleanup::QueueCleanupJob;
