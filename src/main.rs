use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use search_export_scheduler::background_jobs::jobs::{BatchExportSweepJob, QueueCleanupJob};
use search_export_scheduler::background_jobs::{HookNotifier, JobContext, JobScheduler};
use search_export_scheduler::bindings::{read_jsonl, BindingStore};
use search_export_scheduler::config::{AppConfig, CliConfig, FileConfig};
use search_export_scheduler::index::{IndexFilter, IndexStore, NewIndex, SearchIndex};
use search_export_scheduler::job_queue::{JobStatus, QueueStore};
use search_export_scheduler::metadata::Metadata;
use search_export_scheduler::{metrics, App};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cli_style;
use cli_style::get_styles;

/// Bindings written per transaction by `bindings import`.
const IMPORT_CHUNK_SIZE: usize = 1000;

fn parse_path(s: &str) -> Result<PathBuf> {
    let path_buf = PathBuf::from(s);
    let original_path = match path_buf.canonicalize() {
        Ok(path) => path,
        Err(msg) => {
            if msg.kind() == std::io::ErrorKind::NotFound {
                path_buf
            } else {
                return Err(msg).with_context(|| format!("Error resolving path: {}", s));
            }
        }
    };
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

#[derive(Parser, Debug)]
#[command(styles = get_styles(), version)]
struct CliArgs {
    /// Path to a TOML config file. Its values override CLI arguments.
    #[clap(long, global = true, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Directory holding index.db and jobs.db.
    #[clap(long, global = true, value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// The port for the metrics server (Prometheus scraping).
    #[clap(long, global = true, default_value_t = 9091)]
    pub metrics_port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the worker pool, the background jobs and the metrics server
    /// until Ctrl-C.
    Serve,

    /// Manages search indices.
    #[command(subcommand)]
    Index(IndexCommand),

    /// Manages the records bound to an index.
    #[command(subcommand)]
    Bindings(BindingsCommand),

    /// Slices the pending bindings of an index into export jobs, right away.
    Schedule { index: i64 },

    /// Enqueues a deferred batch export for every matching index.
    BatchExport {
        #[clap(flatten)]
        filter: FilterArgs,
    },

    /// Marks every binding of an index for export, then enqueues a batch
    /// export.
    ForceExport { index: i64 },

    /// Enqueues a payload recomputation for every binding of the matching
    /// indices.
    Recompute {
        #[clap(flatten)]
        filter: FilterArgs,

        /// Mark bindings for export even when their payload did not change.
        #[clap(long)]
        force: bool,
    },

    /// Removes every document of an index from its search backend.
    Clear { index: i64 },

    /// Lists queue jobs, most recent first.
    Jobs {
        /// pending, started, done, failed or cancelled.
        #[clap(long)]
        status: Option<String>,

        #[clap(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Subcommand, Debug)]
enum IndexCommand {
    List,

    Create {
        /// Backend name.
        #[clap(long)]
        backend: String,

        /// Language code, e.g. en_US.
        #[clap(long)]
        lang: String,

        /// Model technical name, e.g. product.template.
        #[clap(long)]
        model: String,

        /// Exporter name.
        #[clap(long)]
        exporter: Option<String>,

        #[clap(long)]
        batch_size: Option<i64>,
    },

    /// Deletes an index and its bindings.
    Delete { index: i64 },

    /// Shows an index with its binding counts.
    Show { index: i64 },
}

#[derive(Subcommand, Debug)]
enum BindingsCommand {
    /// Binds the records of a JSON lines file to an index. New or changed
    /// records are marked for export.
    Import {
        index: i64,
        #[clap(value_parser = parse_path)]
        file: PathBuf,
    },

    /// Shows how many bindings of an index are in each state.
    Status { index: i64 },
}

#[derive(clap::Args, Debug)]
struct FilterArgs {
    /// Backend name.
    #[clap(long)]
    backend: Option<String>,

    /// Model technical name.
    #[clap(long)]
    model: Option<String>,

    /// Language code.
    #[clap(long)]
    lang: Option<String>,

    /// Index id, can be repeated.
    #[clap(long = "index")]
    indices: Vec<i64>,
}

impl FilterArgs {
    fn to_filter(&self, metadata: &Metadata) -> Result<IndexFilter> {
        let backend_id = match &self.backend {
            Some(name) => Some(
                metadata
                    .backend_by_name(name)
                    .ok_or_else(|| anyhow!("Unknown backend {:?}", name))?
                    .id,
            ),
            None => None,
        };
        let model_id = match &self.model {
            Some(name) => Some(
                metadata
                    .model_by_name(name)
                    .ok_or_else(|| anyhow!("Unknown model {:?}", name))?
                    .id,
            ),
            None => None,
        };
        let lang_id = match &self.lang {
            Some(code) => Some(
                metadata
                    .language_by_code(code)
                    .ok_or_else(|| anyhow!("Unknown language {:?}", code))?
                    .id,
            ),
            None => None,
        };
        Ok(IndexFilter {
            ids: (!self.indices.is_empty()).then(|| self.indices.clone()),
            backend_id,
            model_id,
            lang_id,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        metrics_port: cli_args.metrics_port,
    };
    let config = AppConfig::resolve(&cli_config, file_config)?;

    match cli_args.command {
        Command::Serve => serve(config).await,
        command => {
            let app = App::open(config, None)?;
            app.sync_indices()?;
            // Store calls block, keep them off the runtime workers
            tokio::task::spawn_blocking(move || run_command(&app, command)).await?
        }
    }
}

async fn serve(config: AppConfig) -> Result<()> {
    info!("Initializing metrics...");
    metrics::init_metrics();

    let (hook_sender, hook_receiver) = mpsc::channel(100);
    let app = App::open(config, Some(Arc::new(HookNotifier::new(hook_sender))))?;
    let declared = app.sync_indices()?;
    info!(
        "{} declared indices, {} known backends",
        declared.len(),
        app.metadata.backends.len()
    );

    let shutdown = CancellationToken::new();

    let pool = Arc::new(app.worker_pool());
    let pool_handle = tokio::spawn(pool.run(shutdown.clone()));

    let job_context = JobContext::new(shutdown.child_token(), app.manager.clone(), app.queue.clone());
    let mut scheduler = JobScheduler::new(hook_receiver, shutdown.clone(), job_context);
    scheduler.register_job(Arc::new(BatchExportSweepJob::new(Duration::from_secs(
        app.config.background_jobs.batch_export_sweep_interval_secs,
    ))));
    scheduler.register_job(Arc::new(QueueCleanupJob::new(
        app.config.background_jobs.queue_retention_days,
    )));
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    let metrics_shutdown = shutdown.clone();
    let metrics_port = app.config.metrics_port;
    let metrics_handle = tokio::spawn(async move {
        if let Err(e) = metrics::run_metrics_server(metrics_port, metrics_shutdown).await {
            error!("Metrics server failed: {}", e);
        }
    });

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Received Ctrl-C, shutting down...");
    shutdown.cancel();

    for (name, handle) in [
        ("worker pool", pool_handle),
        ("scheduler", scheduler_handle),
        ("metrics server", metrics_handle),
    ] {
        if let Err(e) = handle.await {
            error!("The {} task failed: {}", name, e);
        }
    }
    info!("Shutdown complete");
    Ok(())
}

fn run_command(app: &App, command: Command) -> Result<()> {
    let manager = &app.manager;
    match command {
        Command::Serve => bail!("serve cannot run as a one-shot command"),
        Command::Index(command) => run_index_command(app, command)?,
        Command::Bindings(BindingsCommand::Import { index, file }) => {
            let index = manager.get_index(index)?;
            let reader = BufReader::new(
                File::open(&file).with_context(|| format!("Failed to open {:?}", file))?,
            );
            let records = read_jsonl(reader)?;
            let mut marked = 0;
            for chunk in records.chunks(IMPORT_CHUNK_SIZE) {
                marked += app.bindings.upsert(index.id, chunk)?;
            }
            println!(
                "Imported {} records into '{}', {} marked for export",
                records.len(),
                index.display_name(),
                marked
            );
        }
        Command::Bindings(BindingsCommand::Status { index }) => {
            let index = manager.get_index(index)?;
            let counts = app.bindings.state_counts(index.id)?;
            println!("{}", index.display_name());
            println!("  to_update: {}", counts.to_update);
            println!("  scheduled: {}", counts.scheduled);
            println!("  done:      {}", counts.done);
            println!("  error:     {}", counts.error);
        }
        Command::Schedule { index } => {
            let summary = manager.schedule_batch_export(index)?;
            println!(
                "Scheduled {} bindings in {} batches",
                summary.total,
                summary.jobs.len()
            );
        }
        Command::BatchExport { filter } => {
            let handles =
                manager.generate_batch_export_per_index(&filter.to_filter(&app.metadata)?)?;
            println!("Enqueued {} batch export preparations", handles.len());
        }
        Command::ForceExport { index } => {
            let handle = manager.force_batch_export(index)?;
            println!("Enqueued job {}", handle.uuid);
        }
        Command::Recompute { filter, force } => {
            let count = manager.recompute_all_index(&filter.to_filter(&app.metadata)?, force)?;
            println!("Enqueued {} recomputations", count);
        }
        Command::Clear { index } => {
            manager.clear_index(index)?;
            println!("Cleared index {}", index);
        }
        Command::Jobs { status, limit } => {
            let status = match status {
                Some(s) => Some(
                    JobStatus::parse(&s).ok_or_else(|| anyhow!("Unknown job status {:?}", s))?,
                ),
                None => None,
            };
            let jobs = app.queue.list(status, limit)?;
            if jobs.is_empty() {
                println!("No jobs");
            }
            for job in jobs {
                println!(
                    "{}  {:<9}  {:<40}  attempts={}  {}",
                    job.uuid, job.status, job.channel, job.attempts, job.description
                );
                if let Some(err) = job.error {
                    println!("    last error: {}", err);
                }
            }
        }
    }
    Ok(())
}

fn run_index_command(app: &App, command: IndexCommand) -> Result<()> {
    match command {
        IndexCommand::List => {
            let indices = app.indices.find(&IndexFilter::all())?;
            if indices.is_empty() {
                println!("No indices");
            }
            for index in indices {
                print_index_line(&index);
            }
        }
        IndexCommand::Create {
            backend,
            lang,
            model,
            exporter,
            batch_size,
        } => {
            let metadata = &app.metadata;
            let exporter_id = match exporter {
                Some(name) => Some(
                    metadata
                        .exporters
                        .iter()
                        .find(|e| e.name == name)
                        .ok_or_else(|| anyhow!("Unknown exporter {:?}", name))?
                        .id,
                ),
                None => None,
            };
            let new_index = NewIndex {
                backend_id: metadata
                    .backend_by_name(&backend)
                    .ok_or_else(|| anyhow!("Unknown backend {:?}", backend))?
                    .id,
                lang_id: metadata
                    .language_by_code(&lang)
                    .ok_or_else(|| anyhow!("Unknown language {:?}", lang))?
                    .id,
                model_id: metadata
                    .model_by_name(&model)
                    .ok_or_else(|| anyhow!("Unknown model {:?}", model))?
                    .id,
                exporter_id,
                batch_size,
            };
            let index = app.indices.create(new_index)?;
            println!("Created index {} '{}'", index.id, index.display_name());
        }
        IndexCommand::Delete { index } => {
            if !app.indices.delete(index)? {
                bail!("Index {} not found", index);
            }
            println!("Deleted index {}", index);
        }
        IndexCommand::Show { index } => {
            let index = app.manager.get_index(index)?;
            let counts = app.bindings.state_counts(index.id)?;
            let shown = serde_json::json!({
                "index": index,
                "bindings": counts,
            });
            println!("{}", serde_json::to_string_pretty(&shown)?);
        }
    }
    Ok(())
}

fn print_index_line(index: &SearchIndex) {
    println!(
        "{:>4}  {:<40}  batch_size={}",
        index.id,
        index.display_name(),
        index.batch_size
    );
}
