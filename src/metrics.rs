use anyhow::Result;
use axum::{http::StatusCode, response::IntoResponse, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    CounterVec, Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts,
    Registry, TextEncoder,
};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Metric name prefix for all scheduler metrics
const PREFIX: &str = "se_scheduler";

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Batch scheduling
    pub static ref EXPORT_BATCHES_ENQUEUED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_export_batches_enqueued_total"), "Export batch jobs enqueued"),
        &["index"]
    ).expect("Failed to create export_batches_enqueued_total metric");

    pub static ref BINDINGS_SCHEDULED_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new(format!("{PREFIX}_bindings_scheduled_total"), "Bindings moved to scheduled"),
        &["index"]
    ).expect("Failed to create bindings_scheduled_total metric");

    pub static ref BINDINGS_EXPORTED_TOTAL: IntCounter = IntCounter::new(
        format!("{PREFIX}_bindings_exported_total"),
        "Bindings confirmed by a search backend"
    ).expect("Failed to create bindings_exported_total metric");

    // Job queue
    pub static ref QUEUE_JOBS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_queue_jobs_total"), "Queue job executions by outcome"),
        &["channel", "outcome"]
    ).expect("Failed to create queue_jobs_total metric");

    pub static ref QUEUE_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_queue_job_duration_seconds"),
            "Queue job execution duration in seconds"
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0, 120.0]),
        &["channel"]
    ).expect("Failed to create queue_job_duration_seconds metric");

    // Background jobs
    pub static ref BACKGROUND_JOB_EXECUTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(format!("{PREFIX}_background_job_executions_total"), "Background job runs"),
        &["job_id", "status"]
    ).expect("Failed to create background_job_executions_total metric");

    pub static ref BACKGROUND_JOB_DURATION_SECONDS: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            format!("{PREFIX}_background_job_duration_seconds"),
            "Background job duration in seconds"
        )
        .buckets(vec![0.1, 1.0, 10.0, 60.0, 300.0]),
        &["job_id"]
    ).expect("Failed to create background_job_duration_seconds metric");

    pub static ref BACKGROUND_JOB_RUNNING: GaugeVec = GaugeVec::new(
        Opts::new(format!("{PREFIX}_background_job_running"), "Whether a background job is running"),
        &["job_id"]
    ).expect("Failed to create background_job_running metric");
}

/// Register all metrics with the registry. Safe to call more than once.
pub fn init_metrics() {
    let _ = REGISTRY.register(Box::new(EXPORT_BATCHES_ENQUEUED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BINDINGS_SCHEDULED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BINDINGS_EXPORTED_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_JOBS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(QUEUE_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_EXECUTIONS_TOTAL.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_DURATION_SECONDS.clone()));
    let _ = REGISTRY.register(Box::new(BACKGROUND_JOB_RUNNING.clone()));

    tracing::info!("Metrics system initialized successfully");
}

pub fn record_batch_enqueued(index: &str, bindings: usize) {
    EXPORT_BATCHES_ENQUEUED_TOTAL.with_label_values(&[index]).inc();
    BINDINGS_SCHEDULED_TOTAL
        .with_label_values(&[index])
        .inc_by(bindings as u64);
}

pub fn record_bindings_exported(count: usize) {
    BINDINGS_EXPORTED_TOTAL.inc_by(count as u64);
}

/// Record one execution of a queue job. `outcome` is done, retry or failed.
pub fn record_queue_job(channel: &str, outcome: &str, duration: Duration) {
    QUEUE_JOBS_TOTAL.with_label_values(&[channel, outcome]).inc();
    QUEUE_JOB_DURATION_SECONDS
        .with_label_values(&[channel])
        .observe(duration.as_secs_f64());
}

pub fn record_background_job_execution(job_id: &str, status: &str, duration: Duration) {
    BACKGROUND_JOB_EXECUTIONS_TOTAL
        .with_label_values(&[job_id, status])
        .inc();
    BACKGROUND_JOB_DURATION_SECONDS
        .with_label_values(&[job_id])
        .observe(duration.as_secs_f64());
}

pub fn set_background_job_running(job_id: &str, running: bool) {
    BACKGROUND_JOB_RUNNING
        .with_label_values(&[job_id])
        .set(if running { 1.0 } else { 0.0 });
}

/// Handler for the /metrics endpoint
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {
            let response = String::from_utf8(buffer).unwrap_or_default();
            (StatusCode::OK, response)
        }
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to encode metrics: {}", e),
            )
        }
    }
}

/// Serves `/metrics` until `shutdown` is cancelled.
pub async fn run_metrics_server(port: u16, shutdown: CancellationToken) -> Result<()> {
    let app = Router::new().route("/metrics", get(metrics_handler));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    tracing::info!("Metrics available at port {}", port);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    Ok(())
}
