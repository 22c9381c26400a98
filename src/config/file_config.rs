use crate::metadata::{Backend, Exporter, Language, ModelInfo};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub db_dir: Option<String>,
    pub metrics_port: Option<u16>,

    // Feature configs
    pub worker: Option<WorkerConfig>,
    pub background_jobs: Option<BackgroundJobsConfig>,

    // Metadata registry
    pub backends: Vec<Backend>,
    pub languages: Vec<Language>,
    pub models: Vec<ModelInfo>,
    pub exporters: Vec<Exporter>,

    /// Indices created at startup when missing.
    pub indices: Vec<IndexDeclaration>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_ms: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_backoff_secs: Option<u64>,
    pub max_backoff_secs: Option<u64>,
    pub backoff_multiplier: Option<f64>,
    pub stale_job_threshold_secs: Option<u64>,
    /// Concurrency of the loop serving channels without a dedicated loop.
    pub root_capacity: Option<usize>,
    pub channels: Vec<ChannelConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    pub name: String,
    #[serde(default = "default_channel_capacity")]
    pub capacity: usize,
}

fn default_channel_capacity() -> usize {
    1
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct BackgroundJobsConfig {
    pub batch_export_sweep_interval_secs: Option<u64>,
    pub queue_retention_days: Option<u64>,
}

/// Index declared by names rather than ids.
#[derive(Debug, Deserialize, Clone)]
pub struct IndexDeclaration {
    /// Backend name.
    pub backend: String,
    /// Language code.
    pub lang: String,
    /// Model technical name.
    pub model: String,
    /// Exporter name.
    #[serde(default)]
    pub exporter: Option<String>,
    #[serde(default)]
    pub batch_size: Option<i64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
