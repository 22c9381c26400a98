use serde::{Deserialize, Serialize};

/// Channel of the per-batch export jobs.
pub const CHANNEL_EXPORT: &str = "root.search_engine";
/// Channel of the jobs that schedule a batch export for one index.
pub const CHANNEL_PREPARE_BATCH_EXPORT: &str = "root.search_engine.prepare_batch_export";
/// Channel of the per-binding payload recomputation jobs.
pub const CHANNEL_RECOMPUTE_JSON: &str = "root.search_engine.recompute_json";

/// Unit of work carried by a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobPayload {
    PrepareBatchExport { index_id: i64 },
    ExportBatch { index_id: i64, binding_ids: Vec<i64> },
    RecomputeBinding { binding_id: i64, force_export: bool },
}

/// Opaque reference to an enqueued job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobHandle {
    pub uuid: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Started,
    Done,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Started => "started",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "started" => Some(JobStatus::Started),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            "cancelled" => Some(JobStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueuedJob {
    pub uuid: String,
    pub channel: String,
    pub description: String,
    pub payload: JobPayload,
    pub status: JobStatus,
    /// Number of times the job was claimed.
    pub attempts: i64,
    pub max_retries: i64,
    /// Earliest time the job may run (unix seconds).
    pub eta: i64,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub finished_at: Option<i64>,
    pub error: Option<String>,
}

impl QueuedJob {
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            uuid: self.uuid.clone(),
        }
    }
}

/// Which channels a worker loop claims from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelFilter {
    Only(String),
    /// Every channel except the listed ones.
    Except(Vec<String>),
}

impl ChannelFilter {
    pub fn accepts(&self, channel: &str) -> bool {
        match self {
            ChannelFilter::Only(name) => name == channel,
            ChannelFilter::Except(names) => !names.iter().any(|n| n == channel),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ChannelFilter::Only(name) => name,
            ChannelFilter::Except(_) => "root",
        }
    }
}
