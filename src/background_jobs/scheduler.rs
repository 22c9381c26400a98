use super::context::JobContext;
use super::job::{BackgroundJob, HookEvent, JobError};
use crate::metrics;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(60);
/// How often finished jobs are reaped while some job is running.
const RUNNING_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Manages background job scheduling and execution.
pub struct JobScheduler {
    jobs: HashMap<String, Arc<dyn BackgroundJob>>,

    /// Next due time of interval-based jobs.
    next_runs: HashMap<String, Instant>,

    /// Currently running jobs with their task handles.
    running_handles: HashMap<String, JoinHandle<()>>,

    job_cancel_tokens: HashMap<String, CancellationToken>,

    /// Hooks received while their job was running, replayed once it finishes.
    pending_hooks: HashMap<String, HookEvent>,

    hook_receiver: mpsc::Receiver<HookEvent>,

    shutdown_token: CancellationToken,

    job_context: JobContext,
}

impl JobScheduler {
    pub fn new(
        hook_receiver: mpsc::Receiver<HookEvent>,
        shutdown_token: CancellationToken,
        job_context: JobContext,
    ) -> Self {
        Self {
            jobs: HashMap::new(),
            next_runs: HashMap::new(),
            running_handles: HashMap::new(),
            job_cancel_tokens: HashMap::new(),
            pending_hooks: HashMap::new(),
            hook_receiver,
            shutdown_token,
            job_context,
        }
    }

    /// Register a job with the scheduler. Interval jobs are due right away.
    pub fn register_job(&mut self, job: Arc<dyn BackgroundJob>) {
        let job_id = job.id().to_string();
        info!("Registering job: {} - {}", job_id, job.description());
        if job.schedule().interval().is_some() {
            self.next_runs.insert(job_id.clone(), Instant::now());
        }
        self.jobs.insert(job_id, job);
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    fn is_running(&self, job_id: &str) -> bool {
        self.running_handles.contains_key(job_id)
    }

    /// Main scheduler loop.
    pub async fn run(&mut self) {
        info!(
            "Starting job scheduler with {} registered jobs",
            self.job_count()
        );

        self.trigger_jobs_for_hook(HookEvent::OnStartup);

        loop {
            self.cleanup_completed_jobs().await;

            let sleep_duration = self.time_until_next_scheduled_job();
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs();
                }
                Some(event) = self.hook_receiver.recv() => {
                    debug!("Received hook event: {}", event);
                    self.trigger_jobs_for_hook(event);
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    self.shutdown().await;
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    fn time_until_next_scheduled_job(&self) -> Duration {
        let mut min_duration = if self.running_handles.is_empty() {
            IDLE_CHECK_INTERVAL
        } else {
            RUNNING_CHECK_INTERVAL
        };

        let now = Instant::now();
        for (job_id, next_run) in &self.next_runs {
            if self.is_running(job_id) {
                continue;
            }
            let duration = next_run.saturating_duration_since(now);
            if duration < min_duration {
                min_duration = duration;
            }
        }
        min_duration
    }

    fn run_due_jobs(&mut self) {
        let now = Instant::now();
        let due: Vec<String> = self
            .next_runs
            .iter()
            .filter(|(job_id, next_run)| **next_run <= now && !self.is_running(job_id))
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in due {
            self.spawn_job(&job_id, "schedule");
        }
    }

    /// Trigger all jobs that listen for a specific hook event.
    fn trigger_jobs_for_hook(&mut self, event: HookEvent) {
        let listeners: Vec<String> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.schedule().listens_to(event))
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in listeners {
            if self.is_running(&job_id) {
                debug!("Job {} is running, deferring hook {}", job_id, event);
                self.pending_hooks.insert(job_id, event);
                continue;
            }
            self.spawn_job(&job_id, &format!("hook:{}", event));
        }
    }

    fn spawn_job(&mut self, job_id: &str, triggered_by: &str) {
        let job = match self.jobs.get(job_id) {
            Some(job) => Arc::clone(job),
            None => {
                error!("Attempted to spawn unknown job: {}", job_id);
                return;
            }
        };

        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);

        // Any run restarts the interval
        if let Some(interval) = job.schedule().interval() {
            self.next_runs
                .insert(job_id.to_string(), Instant::now() + interval);
        }

        metrics::set_background_job_running(job_id, true);

        let cancel_token = self.job_context.cancellation_token.child_token();
        self.job_cancel_tokens
            .insert(job_id.to_string(), cancel_token.clone());
        let ctx = self.job_context.with_token(cancel_token);
        let job_id_owned = job_id.to_string();

        let handle = tokio::spawn(async move {
            let start_time = Instant::now();
            let result = tokio::task::spawn_blocking(move || job.execute(&ctx)).await;
            let elapsed = start_time.elapsed();

            let status_label = match result {
                Ok(Ok(())) => {
                    info!("Job {} completed successfully in {:?}", job_id_owned, elapsed);
                    "success"
                }
                Ok(Err(JobError::Cancelled)) => {
                    info!("Job {} was cancelled after {:?}", job_id_owned, elapsed);
                    "cancelled"
                }
                Ok(Err(e)) => {
                    error!("Job {} failed after {:?}: {}", job_id_owned, elapsed, e);
                    "failed"
                }
                Err(e) => {
                    error!("Job {} panicked after {:?}: {}", job_id_owned, elapsed, e);
                    "panic"
                }
            };

            metrics::record_background_job_execution(&job_id_owned, status_label, elapsed);
            metrics::set_background_job_running(&job_id_owned, false);
        });

        self.running_handles.insert(job_id.to_string(), handle);
    }

    /// Reap finished jobs and replay the hooks they missed.
    async fn cleanup_completed_jobs(&mut self) {
        let completed: Vec<String> = self
            .running_handles
            .iter()
            .filter(|(_, handle)| handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect();

        for job_id in completed {
            if let Some(handle) = self.running_handles.remove(&job_id) {
                let _ = handle.await;
            }
            self.job_cancel_tokens.remove(&job_id);

            if let Some(event) = self.pending_hooks.remove(&job_id) {
                self.spawn_job(&job_id, &format!("hook:{}", event));
            }
        }
    }

    async fn shutdown(&mut self) {
        info!("Shutting down scheduler...");

        for job_id in self.running_handles.keys() {
            if let Some(token) = self.job_cancel_tokens.get(job_id) {
                debug!("Cancelling job: {}", job_id);
                token.cancel();
            }
        }

        let handles: Vec<(String, JoinHandle<()>)> = self.running_handles.drain().collect();
        for (job_id, handle) in handles {
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await.is_err() {
                warn!("Job {} did not stop within {:?}", job_id, SHUTDOWN_TIMEOUT);
            }
        }

        self.job_cancel_tokens.clear();
        self.pending_hooks.clear();
        info!("Scheduler shutdown complete");
    }
}
