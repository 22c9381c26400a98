use super::models::{ChannelFilter, JobHandle, JobPayload, JobStatus, QueuedJob};
use super::schema::JOB_QUEUE_SCHEMAS;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Accepts units of work for asynchronous, at-least-once execution.
#[cfg_attr(feature = "mock", mockall::automock)]
pub trait JobQueue: Send + Sync {
    /// Queues a job and returns without waiting for it to run.
    fn enqueue(&self, channel: &str, description: &str, payload: &JobPayload) -> Result<JobHandle>;

    /// Cancels a job that has not started yet.
    /// Returns false when the job already started or finished.
    fn cancel(&self, handle: &JobHandle) -> Result<bool>;
}

/// Worker-side operations of the queue.
pub trait QueueStore: JobQueue {
    /// Atomically moves the next due pending job of an accepted channel to
    /// `started` and returns it.
    fn claim_next(&self, filter: &ChannelFilter) -> Result<Option<QueuedJob>>;

    fn mark_done(&self, uuid: &str) -> Result<()>;

    /// Puts a failed job back to `pending`, due at `eta`.
    fn mark_retry(&self, uuid: &str, eta: i64, error: &str) -> Result<()>;

    fn mark_failed(&self, uuid: &str, error: &str) -> Result<()>;

    /// Returns jobs left `started` for longer than `threshold_secs` to
    /// `pending`. Returns how many were requeued.
    fn requeue_stale(&self, threshold_secs: i64) -> Result<usize>;

    fn get(&self, uuid: &str) -> Result<Option<QueuedJob>>;

    /// Most recent jobs first.
    fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<QueuedJob>>;

    /// Deletes done and cancelled jobs finished before `older_than`.
    fn cleanup(&self, older_than: i64) -> Result<usize>;
}

/// Persistent job queue backed by SQLite.
pub struct SqliteJobQueue {
    conn: Arc<Mutex<Connection>>,
    max_retries: i64,
}

impl SqliteJobQueue {
    /// Opens the queue database, creating it if needed.
    ///
    /// `max_retries` is recorded on every job enqueued through this queue.
    pub fn new<P: AsRef<Path>>(db_path: P, max_retries: u32) -> Result<Self> {
        let conn = open_versioned(db_path.as_ref(), "job queue", JOB_QUEUE_SCHEMAS)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_retries: max_retries as i64,
        })
    }

    pub fn in_memory(max_retries: u32) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        JOB_QUEUE_SCHEMAS
            .last()
            .context("No schemas defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            max_retries: max_retries as i64,
        })
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<QueuedJob> {
        let payload: String = row.get("payload")?;
        let payload = serde_json::from_str(&payload)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
        let status: String = row.get("status")?;
        let status = JobStatus::parse(&status).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                4,
                Type::Text,
                format!("Unknown job status '{}'", status).into(),
            )
        })?;

        Ok(QueuedJob {
            uuid: row.get("uuid")?,
            channel: row.get("channel")?,
            description: row.get("description")?,
            payload,
            status,
            attempts: row.get("attempts")?,
            max_retries: row.get("max_retries")?,
            eta: row.get("eta")?,
            created_at: row.get("created_at")?,
            started_at: row.get("started_at")?,
            finished_at: row.get("finished_at")?,
            error: row.get("error")?,
        })
    }

    fn finish(&self, uuid: &str, status: JobStatus, error: Option<&str>) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE queue_job SET status = ?1, finished_at = ?2, error = ?3 WHERE uuid = ?4",
            params![status.as_str(), Self::now(), error, uuid],
        )?;
        Ok(())
    }
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, channel: &str, description: &str, payload: &JobPayload) -> Result<JobHandle> {
        let uuid = uuid::Uuid::new_v4().to_string();
        let payload_json = serde_json::to_string(payload)?;
        let now = Self::now();

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO queue_job (uuid, channel, description, payload, status, attempts,
                max_retries, eta, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8)",
            params![
                uuid,
                channel,
                description,
                payload_json,
                JobStatus::Pending.as_str(),
                self.max_retries,
                now,
                now
            ],
        )
        .with_context(|| format!("Failed to enqueue job on channel {}", channel))?;

        debug!("Enqueued job {} on {}: {}", uuid, channel, description);
        Ok(JobHandle { uuid })
    }

    fn cancel(&self, handle: &JobHandle) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let cancelled = conn.execute(
            "UPDATE queue_job SET status = ?1, finished_at = ?2
             WHERE uuid = ?3 AND status = ?4",
            params![
                JobStatus::Cancelled.as_str(),
                Self::now(),
                handle.uuid,
                JobStatus::Pending.as_str()
            ],
        )?;
        if cancelled > 0 {
            info!("Cancelled job {}", handle.uuid);
        }
        Ok(cancelled > 0)
    }
}

impl QueueStore for SqliteJobQueue {
    fn claim_next(&self, filter: &ChannelFilter) -> Result<Option<QueuedJob>> {
        let now = Self::now();
        let mut values: Vec<Box<dyn ToSql>> = vec![
            Box::new(JobStatus::Pending.as_str()),
            Box::new(now),
        ];
        let channel_clause = match filter {
            ChannelFilter::Only(channel) => {
                values.push(Box::new(channel.clone()));
                "AND channel = ?3".to_string()
            }
            ChannelFilter::Except(channels) if channels.is_empty() => String::new(),
            ChannelFilter::Except(channels) => {
                let placeholders = (0..channels.len())
                    .map(|i| format!("?{}", i + 3))
                    .collect::<Vec<_>>()
                    .join(", ");
                for channel in channels {
                    values.push(Box::new(channel.clone()));
                }
                format!("AND channel NOT IN ({})", placeholders)
            }
        };
        let sql = format!(
            "SELECT uuid FROM queue_job WHERE status = ?1 AND eta <= ?2 {}
             ORDER BY eta, created_at, rowid LIMIT 1",
            channel_clause
        );
        let value_refs: Vec<&dyn ToSql> = values.iter().map(|v| v.as_ref()).collect();

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let uuid: Option<String> = tx
            .query_row(&sql, value_refs.as_slice(), |row| row.get(0))
            .optional()?;
        let Some(uuid) = uuid else {
            return Ok(None);
        };

        let claimed = tx.execute(
            "UPDATE queue_job SET status = ?1, started_at = ?2, attempts = attempts + 1
             WHERE uuid = ?3 AND status = ?4",
            params![
                JobStatus::Started.as_str(),
                now,
                uuid,
                JobStatus::Pending.as_str()
            ],
        )?;
        if claimed == 0 {
            return Ok(None);
        }
        let job = tx.query_row(
            "SELECT * FROM queue_job WHERE uuid = ?1",
            params![uuid],
            Self::row_to_job,
        )?;
        tx.commit()?;
        Ok(Some(job))
    }

    fn mark_done(&self, uuid: &str) -> Result<()> {
        self.finish(uuid, JobStatus::Done, None)
    }

    fn mark_retry(&self, uuid: &str, eta: i64, error: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE queue_job SET status = ?1, eta = ?2, error = ?3, started_at = NULL
             WHERE uuid = ?4",
            params![JobStatus::Pending.as_str(), eta, error, uuid],
        )?;
        Ok(())
    }

    fn mark_failed(&self, uuid: &str, error: &str) -> Result<()> {
        self.finish(uuid, JobStatus::Failed, Some(error))
    }

    fn requeue_stale(&self, threshold_secs: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let requeued = conn.execute(
            "UPDATE queue_job SET status = ?1, started_at = NULL
             WHERE status = ?2 AND started_at < ?3",
            params![
                JobStatus::Pending.as_str(),
                JobStatus::Started.as_str(),
                Self::now() - threshold_secs
            ],
        )?;
        Ok(requeued)
    }

    fn get(&self, uuid: &str) -> Result<Option<QueuedJob>> {
        let conn = self.conn.lock().unwrap();
        let job = conn
            .query_row(
                "SELECT * FROM queue_job WHERE uuid = ?1",
                params![uuid],
                Self::row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    fn list(&self, status: Option<JobStatus>, limit: usize) -> Result<Vec<QueuedJob>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT * FROM queue_job WHERE (?1 IS NULL OR status = ?1)
             ORDER BY created_at DESC, rowid DESC LIMIT ?2",
        )?;
        let jobs = stmt
            .query_map(
                params![status.map(|s| s.as_str()), limit as i64],
                Self::row_to_job,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    fn cleanup(&self, older_than: i64) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute(
            "DELETE FROM queue_job WHERE status IN (?1, ?2) AND finished_at < ?3",
            params![
                JobStatus::Done.as_str(),
                JobStatus::Cancelled.as_str(),
                older_than
            ],
        )?;
        Ok(deleted)
    }
}
