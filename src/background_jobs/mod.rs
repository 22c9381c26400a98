//! Background job scheduling and execution system.
//!
//! Runs periodic and event-triggered maintenance next to the job queue
//! workers, such as sweeping indices for bindings to export.

mod context;
mod hooks;
mod job;
pub mod jobs;
mod scheduler;

pub use context::JobContext;
pub use hooks::HookNotifier;
pub use job::{BackgroundJob, HookEvent, JobError, JobSchedule};
pub use scheduler::JobScheduler;
