mod file_config;

pub use file_config::{
    BackgroundJobsConfig, ChannelConfig, FileConfig, IndexDeclaration, WorkerConfig,
};

use crate::index::NewIndex;
use crate::metadata::Metadata;
use anyhow::{anyhow, bail, Result};
use std::collections::HashSet;
use std::path::PathBuf;

/// CLI arguments that can be used for config resolution.
/// This struct mirrors the CLI arguments that can be overridden by TOML config.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    pub db_dir: Option<PathBuf>,
    pub metrics_port: u16,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    // Core settings
    pub db_dir: PathBuf,
    pub metrics_port: u16,

    // Feature configs (with defaults)
    pub worker: WorkerSettings,
    pub background_jobs: BackgroundJobsSettings,

    pub metadata: Metadata,
    /// Declared indices, resolved to ids.
    pub indices: Vec<NewIndex>,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let db_dir = file
            .db_dir
            .map(PathBuf::from)
            .or_else(|| cli.db_dir.clone())
            .ok_or_else(|| anyhow!("db_dir must be specified via --db-dir or in config file"))?;

        if !db_dir.exists() {
            bail!("Database directory does not exist: {:?}", db_dir);
        }
        if !db_dir.is_dir() {
            bail!("db_dir is not a directory: {:?}", db_dir);
        }

        let metrics_port = file.metrics_port.unwrap_or(cli.metrics_port);

        let defaults = WorkerSettings::default();
        let worker_file = file.worker.unwrap_or_default();
        let worker = WorkerSettings {
            poll_interval_ms: worker_file
                .poll_interval_ms
                .unwrap_or(defaults.poll_interval_ms),
            max_retries: worker_file.max_retries.unwrap_or(defaults.max_retries),
            initial_backoff_secs: worker_file
                .initial_backoff_secs
                .unwrap_or(defaults.initial_backoff_secs),
            max_backoff_secs: worker_file
                .max_backoff_secs
                .unwrap_or(defaults.max_backoff_secs),
            backoff_multiplier: worker_file
                .backoff_multiplier
                .unwrap_or(defaults.backoff_multiplier),
            stale_job_threshold_secs: worker_file
                .stale_job_threshold_secs
                .unwrap_or(defaults.stale_job_threshold_secs),
            root_capacity: worker_file.root_capacity.unwrap_or(defaults.root_capacity),
            channels: resolve_channels(worker_file.channels)?,
        };

        let jobs_file = file.background_jobs.unwrap_or_default();
        let jobs_defaults = BackgroundJobsSettings::default();
        let background_jobs = BackgroundJobsSettings {
            batch_export_sweep_interval_secs: jobs_file
                .batch_export_sweep_interval_secs
                .unwrap_or(jobs_defaults.batch_export_sweep_interval_secs),
            queue_retention_days: jobs_file
                .queue_retention_days
                .unwrap_or(jobs_defaults.queue_retention_days),
        };

        let metadata = Metadata {
            backends: file.backends,
            languages: file.languages,
            models: file.models,
            exporters: file.exporters,
        };
        let indices = file
            .indices
            .iter()
            .map(|decl| resolve_index(&metadata, decl))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            db_dir,
            metrics_port,
            worker,
            background_jobs,
            metadata,
            indices,
        })
    }

    /// Indices and their bindings.
    pub fn index_db_path(&self) -> PathBuf {
        self.db_dir.join("index.db")
    }

    pub fn jobs_db_path(&self) -> PathBuf {
        self.db_dir.join("jobs.db")
    }
}

fn resolve_channels(channels: Vec<ChannelConfig>) -> Result<Vec<ChannelSettings>> {
    let mut seen = HashSet::new();
    channels
        .into_iter()
        .map(|c| {
            if c.capacity == 0 {
                bail!("Channel {} must have a capacity of at least 1", c.name);
            }
            if !seen.insert(c.name.clone()) {
                bail!("Channel {} is configured twice", c.name);
            }
            Ok(ChannelSettings {
                name: c.name,
                capacity: c.capacity,
            })
        })
        .collect()
}

/// Maps the names of an index declaration to metadata ids.
fn resolve_index(metadata: &Metadata, decl: &IndexDeclaration) -> Result<NewIndex> {
    let backend = metadata
        .backend_by_name(&decl.backend)
        .ok_or_else(|| anyhow!("Index declares unknown backend {:?}", decl.backend))?;
    let lang = metadata
        .language_by_code(&decl.lang)
        .ok_or_else(|| anyhow!("Index declares unknown language {:?}", decl.lang))?;
    let model = metadata
        .model_by_name(&decl.model)
        .ok_or_else(|| anyhow!("Index declares unknown model {:?}", decl.model))?;
    let exporter_id = match &decl.exporter {
        Some(name) => Some(
            metadata
                .exporters
                .iter()
                .find(|e| &e.name == name)
                .map(|e| e.id)
                .ok_or_else(|| anyhow!("Index declares unknown exporter {:?}", name))?,
        ),
        None => None,
    };

    Ok(NewIndex {
        backend_id: backend.id,
        lang_id: lang.id,
        model_id: model.id,
        exporter_id,
        batch_size: decl.batch_size,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSettings {
    pub name: String,
    pub capacity: usize,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Idle delay between two claim attempts of a worker loop.
    pub poll_interval_ms: u64,
    pub max_retries: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
    pub backoff_multiplier: f64,
    /// Jobs `started` for longer than this are requeued on startup.
    pub stale_job_threshold_secs: u64,
    pub root_capacity: usize,
    /// Channels with a dedicated worker loop.
    pub channels: Vec<ChannelSettings>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
            max_retries: 5,
            initial_backoff_secs: 10,
            max_backoff_secs: 3600,
            backoff_multiplier: 2.0,
            stale_job_threshold_secs: 3600,
            root_capacity: 1,
            channels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackgroundJobsSettings {
    pub batch_export_sweep_interval_secs: u64,
    pub queue_retention_days: u64,
}

impl Default for BackgroundJobsSettings {
    fn default() -> Self {
        Self {
            batch_export_sweep_interval_secs: 300,
            queue_retention_days: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_temp_db_dir() -> TempDir {
        TempDir::new().unwrap()
    }

    const FULL_CONFIG: &str = r#"
metrics_port = 9200

[worker]
max_retries = 3
root_capacity = 2

[[worker.channels]]
name = "root.search_engine"
capacity = 4

[background_jobs]
queue_retention_days = 7

[[backends]]
id = 1
name = "My Shop"
kind = "fts5"
path = "/tmp/shop.db"

[[languages]]
id = 1
code = "en_US"

[[models]]
id = 10
model = "product.template"
name = "Product Template"
indexable = true

[[exporters]]
id = 5
name = "Product export"
resource = "product.template"
fields = ["name", "price"]

[[indices]]
backend = "My Shop"
lang = "en_US"
model = "product.template"
exporter = "Product export"
batch_size = 100
"#;

    #[test]
    fn test_resolve_cli_only() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            metrics_port: 9091,
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.db_dir, temp_dir.path());
        assert_eq!(config.metrics_port, 9091);
        assert_eq!(config.worker.max_retries, 5);
        assert!(config.worker.channels.is_empty());
        assert_eq!(config.background_jobs.batch_export_sweep_interval_secs, 300);
        assert!(config.metadata.backends.is_empty());
        assert!(config.indices.is_empty());
    }

    #[test]
    fn test_resolve_full_toml() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            metrics_port: 9091,
        };
        let file_config: FileConfig = toml::from_str(FULL_CONFIG).unwrap();

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values override CLI
        assert_eq!(config.metrics_port, 9200);
        assert_eq!(config.worker.max_retries, 3);
        assert_eq!(config.worker.root_capacity, 2);
        // Defaults used when TOML doesn't specify
        assert_eq!(config.worker.initial_backoff_secs, 10);
        assert_eq!(
            config.worker.channels,
            vec![ChannelSettings {
                name: "root.search_engine".to_string(),
                capacity: 4,
            }]
        );
        assert_eq!(config.background_jobs.queue_retention_days, 7);
        assert_eq!(config.background_jobs.batch_export_sweep_interval_secs, 300);

        assert_eq!(config.metadata.backends[0].path, Some(PathBuf::from("/tmp/shop.db")));
        assert_eq!(config.metadata.exporters[0].fields, vec!["name", "price"]);

        let index = &config.indices[0];
        assert_eq!(index.backend_id, 1);
        assert_eq!(index.lang_id, 1);
        assert_eq!(index.model_id, 10);
        assert_eq!(index.exporter_id, Some(5));
        assert_eq!(index.batch_size, Some(100));
    }

    #[test]
    fn test_resolve_unknown_index_reference_error() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let file_config = FileConfig {
            indices: vec![IndexDeclaration {
                backend: "Nowhere".to_string(),
                lang: "en_US".to_string(),
                model: "product.template".to_string(),
                exporter: None,
                batch_size: None,
            }],
            ..Default::default()
        };

        let err = AppConfig::resolve(&cli, Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("unknown backend"));
    }

    #[test]
    fn test_resolve_invalid_channels_error() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };
        let channel = ChannelConfig {
            name: "root.search_engine".to_string(),
            capacity: 1,
        };
        let file_config = FileConfig {
            worker: Some(WorkerConfig {
                channels: vec![channel.clone(), channel],
                ..Default::default()
            }),
            ..Default::default()
        };

        let err = AppConfig::resolve(&cli, Some(file_config)).unwrap_err();
        assert!(err.to_string().contains("configured twice"));
    }

    #[test]
    fn test_resolve_missing_db_dir_error() {
        let cli = CliConfig::default();
        let result = AppConfig::resolve(&cli, None);
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("db_dir must be specified"));
    }

    #[test]
    fn test_resolve_db_dir_not_directory_error() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        let cli = CliConfig {
            db_dir: Some(temp_file.path().to_path_buf()),
            ..Default::default()
        };
        let result = AppConfig::resolve(&cli, None);
        assert!(result.unwrap_err().to_string().contains("not a directory"));
    }

    #[test]
    fn test_db_path_helpers() {
        let temp_dir = make_temp_db_dir();
        let cli = CliConfig {
            db_dir: Some(temp_dir.path().to_path_buf()),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, None).unwrap();

        assert_eq!(config.index_db_path(), temp_dir.path().join("index.db"));
        assert_eq!(config.jobs_db_path(), temp_dir.path().join("jobs.db"));
    }
}
