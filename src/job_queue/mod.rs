//! Persistent job queue with channels, retries and a worker pool.

mod models;
mod retry_policy;
mod schema;
mod store;
mod worker;

pub use models::{
    ChannelFilter, JobHandle, JobPayload, JobStatus, QueuedJob, CHANNEL_EXPORT,
    CHANNEL_PREPARE_BATCH_EXPORT, CHANNEL_RECOMPUTE_JSON,
};
pub use retry_policy::RetryPolicy;
#[cfg(feature = "mock")]
pub use store::MockJobQueue;
pub use store::{JobQueue, QueueStore, SqliteJobQueue};
pub use worker::{JobExecutor, WorkerPool};
