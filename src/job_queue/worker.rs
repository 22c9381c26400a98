//! Worker loops executing queued jobs.

use super::models::{ChannelFilter, JobStatus, QueuedJob};
use super::retry_policy::RetryPolicy;
use super::store::QueueStore;
use crate::background_jobs::JobError;
use crate::config::WorkerSettings;
use crate::metrics;
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Executes the payload of queued jobs.
///
/// Called from a blocking context using `spawn_blocking`.
pub trait JobExecutor: Send + Sync {
    fn execute(&self, job: &QueuedJob) -> Result<(), JobError>;

    /// Called once when the queue gives up on a job.
    fn on_failed(&self, _job: &QueuedJob, _error: &JobError) {}
}

pub struct WorkerPool {
    queue: Arc<dyn QueueStore>,
    executor: Arc<dyn JobExecutor>,
    retry_policy: RetryPolicy,
    settings: WorkerSettings,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        executor: Arc<dyn JobExecutor>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            executor,
            retry_policy: RetryPolicy::new(&settings),
            settings,
        }
    }

    /// One loop per configured channel plus the root loop serving every
    /// other channel.
    fn channel_loops(&self) -> Vec<(ChannelFilter, usize)> {
        let mut loops: Vec<(ChannelFilter, usize)> = self
            .settings
            .channels
            .iter()
            .map(|c| (ChannelFilter::Only(c.name.clone()), c.capacity.max(1)))
            .collect();
        let dedicated = self.settings.channels.iter().map(|c| c.name.clone()).collect();
        loops.push((
            ChannelFilter::Except(dedicated),
            self.settings.root_capacity.max(1),
        ));
        loops
    }

    /// Runs all worker loops until `shutdown` is cancelled, then waits for
    /// in-flight jobs.
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        let queue = self.queue.clone();
        let threshold = self.settings.stale_job_threshold_secs as i64;
        match tokio::task::spawn_blocking(move || queue.requeue_stale(threshold)).await {
            Ok(Ok(count)) if count > 0 => {
                info!("Requeued {} jobs left running by a previous process", count);
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => error!("Failed to requeue stale jobs: {}", e),
            Err(e) => error!("Stale job requeue task failed: {}", e),
        }

        let loops = self.channel_loops();
        info!("Starting worker pool with {} channel loops", loops.len());
        let handles: Vec<_> = loops
            .into_iter()
            .map(|(filter, capacity)| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_channel(filter, capacity, shutdown).await })
            })
            .collect();

        for handle in handles {
            if let Err(e) = handle.await {
                error!("Worker loop panicked: {}", e);
            }
        }
        info!("Worker pool stopped");
    }

    async fn run_channel(
        self: Arc<Self>,
        filter: ChannelFilter,
        capacity: usize,
        shutdown: CancellationToken,
    ) {
        let poll_interval = Duration::from_millis(self.settings.poll_interval_ms);
        let semaphore = Arc::new(Semaphore::new(capacity));
        debug!(
            "Worker loop for channel {} started with capacity {}",
            filter.label(),
            capacity
        );

        loop {
            let permit = tokio::select! {
                permit = semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
                _ = shutdown.cancelled() => break,
            };

            let queue = self.queue.clone();
            let claim_filter = filter.clone();
            let claimed =
                tokio::task::spawn_blocking(move || queue.claim_next(&claim_filter)).await;

            match claimed {
                Ok(Ok(Some(job))) => {
                    let pool = self.clone();
                    tokio::spawn(async move {
                        pool.process(job).await;
                        drop(permit);
                    });
                    continue;
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => error!("Failed to claim job on {}: {}", filter.label(), e),
                Err(e) => error!("Claim task failed on {}: {}", filter.label(), e),
            }
            drop(permit);

            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                _ = shutdown.cancelled() => break,
            }
        }

        // Wait for in-flight jobs
        let _ = semaphore.acquire_many(capacity as u32).await;
        debug!("Worker loop for channel {} stopped", filter.label());
    }

    /// Executes a claimed job and records its outcome.
    /// Returns the status the job was left in.
    pub async fn process(&self, job: QueuedJob) -> JobStatus {
        let start_time = Instant::now();
        let executor = self.executor.clone();
        let job_for_task = job.clone();
        let result = tokio::task::spawn_blocking(move || executor.execute(&job_for_task))
            .await
            .unwrap_or_else(|e| Err(JobError::ExecutionFailed(format!("Task panic: {}", e))));
        let elapsed = start_time.elapsed();

        let queue = self.queue.clone();
        let executor = self.executor.clone();
        let retry_policy = self.retry_policy.clone();
        let channel = job.channel.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            Self::record_outcome(queue.as_ref(), executor.as_ref(), &retry_policy, &job, result)
        })
        .await;

        match outcome {
            Ok(Ok(status)) => {
                let label = match status {
                    JobStatus::Done => "done",
                    JobStatus::Pending => "retry",
                    _ => "failed",
                };
                metrics::record_queue_job(&channel, label, elapsed);
                status
            }
            Ok(Err(e)) => {
                error!("Failed to record job outcome: {}", e);
                JobStatus::Started
            }
            Err(e) => {
                error!("Job outcome task failed: {}", e);
                JobStatus::Started
            }
        }
    }

    fn record_outcome(
        queue: &dyn QueueStore,
        executor: &dyn JobExecutor,
        retry_policy: &RetryPolicy,
        job: &QueuedJob,
        result: Result<(), JobError>,
    ) -> Result<JobStatus> {
        match result {
            Ok(()) => {
                debug!("Job {} done: {}", job.uuid, job.description);
                queue.mark_done(&job.uuid)?;
                Ok(JobStatus::Done)
            }
            Err(e) if retry_policy.should_retry(&e, job.attempts, job.max_retries) => {
                let retry_count = job.attempts - 1;
                let eta = retry_policy.next_retry_at(retry_count);
                warn!(
                    "Job {} failed (attempt {}), retrying in {}s: {}",
                    job.uuid,
                    job.attempts,
                    retry_policy.backoff_secs(retry_count),
                    e
                );
                queue.mark_retry(&job.uuid, eta, &e.to_string())?;
                Ok(JobStatus::Pending)
            }
            Err(e) => {
                error!(
                    "Job {} failed after {} attempts: {} ({})",
                    job.uuid, job.attempts, e, job.description
                );
                queue.mark_failed(&job.uuid, &e.to_string())?;
                executor.on_failed(job, &e);
                Ok(JobStatus::Failed)
            }
        }
    }

    /// Executes every due job, one at a time, until the queue has none left.
    /// Returns the number of executions.
    pub async fn drain(&self) -> Result<usize> {
        let mut executed = 0;
        loop {
            let queue = self.queue.clone();
            let claimed = tokio::task::spawn_blocking(move || {
                queue.claim_next(&ChannelFilter::Except(Vec::new()))
            })
            .await??;
            match claimed {
                Some(job) => {
                    self.process(job).await;
                    executed += 1;
                }
                None => return Ok(executed),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelSettings;
    use crate::job_queue::{
        JobPayload, JobQueue, SqliteJobQueue, CHANNEL_EXPORT, CHANNEL_PREPARE_BATCH_EXPORT,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Executor failing a configurable number of times before succeeding.
    struct FlakyExecutor {
        failures_left: AtomicUsize,
        permanent: bool,
        executed: AtomicUsize,
        failed_jobs: Mutex<Vec<String>>,
    }

    impl FlakyExecutor {
        fn new(failures: usize, permanent: bool) -> Self {
            Self {
                failures_left: AtomicUsize::new(failures),
                permanent,
                executed: AtomicUsize::new(0),
                failed_jobs: Mutex::new(Vec::new()),
            }
        }
    }

    impl JobExecutor for FlakyExecutor {
        fn execute(&self, _job: &QueuedJob) -> Result<(), JobError> {
            self.executed.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left == 0 {
                return Ok(());
            }
            self.failures_left.store(left - 1, Ordering::SeqCst);
            if self.permanent {
                Err(JobError::Permanent("gone".to_string()))
            } else {
                Err(JobError::ExecutionFailed("flaky".to_string()))
            }
        }

        fn on_failed(&self, job: &QueuedJob, _error: &JobError) {
            self.failed_jobs.lock().unwrap().push(job.uuid.clone());
        }
    }

    fn settings() -> WorkerSettings {
        WorkerSettings {
            poll_interval_ms: 10,
            initial_backoff_secs: 0,
            max_backoff_secs: 0,
            ..Default::default()
        }
    }

    fn payload() -> JobPayload {
        JobPayload::PrepareBatchExport { index_id: 1 }
    }

    #[tokio::test]
    async fn test_process_success_marks_done() {
        let queue = Arc::new(SqliteJobQueue::in_memory(3).unwrap());
        let executor = Arc::new(FlakyExecutor::new(0, false));
        let pool = WorkerPool::new(queue.clone(), executor.clone(), settings());

        let handle = queue.enqueue(CHANNEL_EXPORT, "job", &payload()).unwrap();
        assert_eq!(pool.drain().await.unwrap(), 1);
        assert_eq!(
            queue.get(&handle.uuid).unwrap().unwrap().status,
            JobStatus::Done
        );
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let queue = Arc::new(SqliteJobQueue::in_memory(3).unwrap());
        let executor = Arc::new(FlakyExecutor::new(2, false));
        let pool = WorkerPool::new(queue.clone(), executor.clone(), settings());

        let handle = queue.enqueue(CHANNEL_EXPORT, "job", &payload()).unwrap();
        assert_eq!(pool.drain().await.unwrap(), 3);

        let job = queue.get(&handle.uuid).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.attempts, 3);
        assert!(executor.failed_jobs.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_exhausted_retries_fail_the_job() {
        let queue = Arc::new(SqliteJobQueue::in_memory(1).unwrap());
        let executor = Arc::new(FlakyExecutor::new(5, false));
        let pool = WorkerPool::new(queue.clone(), executor.clone(), settings());

        let handle = queue.enqueue(CHANNEL_EXPORT, "job", &payload()).unwrap();
        assert_eq!(pool.drain().await.unwrap(), 2);

        let job = queue.get(&handle.uuid).unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("Execution failed: flaky"));
        assert_eq!(*executor.failed_jobs.lock().unwrap(), vec![handle.uuid]);
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        let queue = Arc::new(SqliteJobQueue::in_memory(5).unwrap());
        let executor = Arc::new(FlakyExecutor::new(1, true));
        let pool = WorkerPool::new(queue.clone(), executor.clone(), settings());

        let handle = queue.enqueue(CHANNEL_EXPORT, "job", &payload()).unwrap();
        assert_eq!(pool.drain().await.unwrap(), 1);
        assert_eq!(
            queue.get(&handle.uuid).unwrap().unwrap().status,
            JobStatus::Failed
        );
    }

    #[test]
    fn test_channel_loops() {
        let queue = Arc::new(SqliteJobQueue::in_memory(1).unwrap());
        let mut settings = settings();
        settings.root_capacity = 2;
        settings.channels = vec![ChannelSettings {
            name: CHANNEL_EXPORT.to_string(),
            capacity: 4,
        }];
        let pool = WorkerPool::new(queue, Arc::new(FlakyExecutor::new(0, false)), settings);

        assert_eq!(
            pool.channel_loops(),
            vec![
                (ChannelFilter::Only(CHANNEL_EXPORT.to_string()), 4),
                (ChannelFilter::Except(vec![CHANNEL_EXPORT.to_string()]), 2),
            ]
        );
    }

    #[tokio::test]
    async fn test_run_processes_jobs_until_shutdown() {
        let queue = Arc::new(SqliteJobQueue::in_memory(1).unwrap());
        let executor = Arc::new(FlakyExecutor::new(0, false));
        let mut settings = settings();
        settings.channels = vec![ChannelSettings {
            name: CHANNEL_EXPORT.to_string(),
            capacity: 2,
        }];
        let pool = Arc::new(WorkerPool::new(queue.clone(), executor.clone(), settings));

        for _ in 0..3 {
            queue.enqueue(CHANNEL_EXPORT, "export", &payload()).unwrap();
        }
        queue
            .enqueue(CHANNEL_PREPARE_BATCH_EXPORT, "prepare", &payload())
            .unwrap();

        let shutdown = CancellationToken::new();
        let running = tokio::spawn(pool.clone().run(shutdown.clone()));

        let deadline = Instant::now() + Duration::from_secs(5);
        while executor.executed.load(Ordering::SeqCst) < 4 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        shutdown.cancel();
        running.await.unwrap();

        assert_eq!(executor.executed.load(Ordering::SeqCst), 4);
        assert_eq!(queue.list(Some(JobStatus::Done), 10).unwrap().len(), 4);
    }
}
