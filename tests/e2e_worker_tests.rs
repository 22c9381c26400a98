//! End-to-end tests for export execution
//!
//! Runs queued jobs against the FTS5 backend: batch exports, retries and
//! failures, payload recomputation, clearing and the background sweep.

mod common;

use common::*;
use search_export_scheduler::adapter::Fts5Adapter;
use search_export_scheduler::background_jobs::jobs::BatchExportSweepJob;
use search_export_scheduler::background_jobs::{HookEvent, HookNotifier, JobContext, JobScheduler};
use search_export_scheduler::bindings::{BindingStore, SyncState};
use search_export_scheduler::index::{IndexFilter, IndexStore, NewIndex};
use search_export_scheduler::job_queue::{
    JobPayload, JobStatus, QueueStore, CHANNEL_EXPORT, CHANNEL_RECOMPUTE_JSON,
};
use search_export_scheduler::export::RecomputeOutcome;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

// =============================================================================
// Export
// =============================================================================

#[tokio::test]
async fn test_batch_export_reaches_search_backend() {
    let env = TestEnv::new();
    let index = env.shop_index();
    env.import(&index, &products(5));

    env.app
        .manager
        .generate_batch_export_per_index(&IndexFilter::all())
        .unwrap();
    // One preparation, then one job per batch
    assert_eq!(env.drain_queue().await, 4);

    assert_eq!(env.counts(&index).done, 5);
    assert!(env
        .jobs(None)
        .iter()
        .all(|job| job.status == JobStatus::Done));

    let corpus = env.shop_corpus();
    assert_eq!(corpus.document_count().unwrap(), 5);
    assert_eq!(
        corpus.document("r1").unwrap(),
        Some(json!({ "id": "r1", "name": "Product 1", "price": 1.0 }))
    );
}

#[tokio::test]
async fn test_exported_payload_is_stored_on_binding() {
    let env = TestEnv::new();
    let index = env.shop_index();
    let ids = env.import(&index, &products(1));

    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;

    let binding = env.app.bindings.get(ids[0]).unwrap().unwrap();
    assert_eq!(binding.sync_state, SyncState::Done);
    assert_eq!(
        binding.data,
        Some(json!({ "id": "r1", "name": "Product 1", "price": 1.0 }))
    );
}

#[tokio::test]
async fn test_failed_batch_is_retried_then_marked_error() {
    let env = TestEnv::new();
    let index = env
        .app
        .indices
        .create(NewIndex {
            backend_id: BROKEN_BACKEND_ID,
            lang_id: EN_US_ID,
            model_id: PRODUCT_MODEL_ID,
            exporter_id: None,
            batch_size: None,
        })
        .unwrap();
    env.import(&index, &products(3));

    let summary = env.app.manager.schedule_batch_export(index.id).unwrap();
    assert_eq!(env.counts(&index).scheduled, 3);

    // First attempt and its single retry
    assert_eq!(env.drain_queue().await, 2);

    let job = env.app.queue.get(&summary.jobs[0].uuid).unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.attempts, 2);
    assert!(job.error.is_some());
    assert_eq!(env.counts(&index).error, 3);
}

#[tokio::test]
async fn test_clear_index_empties_backend_only() {
    let env = TestEnv::new();
    let index = env.shop_index();
    env.import(&index, &products(3));
    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;
    assert_eq!(env.shop_corpus().document_count().unwrap(), 3);

    env.app.manager.clear_index(index.id).unwrap();

    assert_eq!(env.shop_corpus().document_count().unwrap(), 0);
    assert_eq!(env.counts(&index).done, 3);
}

#[tokio::test]
async fn test_force_export_reexports_everything() {
    let env = TestEnv::new();
    let index = env.shop_index();
    env.import(&index, &products(3));
    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;
    env.app.manager.clear_index(index.id).unwrap();

    env.app.manager.force_batch_export(index.id).unwrap();
    env.drain_queue().await;

    assert_eq!(env.counts(&index).done, 3);
    assert_eq!(env.shop_corpus().document_count().unwrap(), 3);
}

#[tokio::test]
async fn test_backend_rename_moves_documents_to_new_name() {
    let env = TestEnv::new();
    let index = env.shop_index();
    env.import(&index, &products(3));
    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;
    assert_eq!(env.shop_corpus().document_count().unwrap(), 3);

    let app = env.reopen_with(|config| config.replace("\"My Shop\"", "\"Big Shop\""));

    let renamed = app.indices.get(index.id).unwrap().unwrap();
    assert_eq!(
        renamed.name.as_deref(),
        Some("big_shop_product_template_en_US")
    );
    assert_eq!(app.indices.find(&IndexFilter::all()).unwrap().len(), 1);
    // Nothing left under the previous name
    assert_eq!(env.shop_corpus().document_count().unwrap(), 0);
    assert_eq!(env.counts(&index).to_update, 3);

    app.worker_pool().drain().await.unwrap();

    let conn = Fts5Adapter::open_corpus(&env.dir.path().join("shop_corpus.db")).unwrap();
    let corpus = Fts5Adapter::new(conn, "big_shop_product_template_en_US").unwrap();
    assert_eq!(corpus.document_count().unwrap(), 3);
    assert_eq!(env.counts(&index).done, 3);
}

// =============================================================================
// Recompute
// =============================================================================

#[tokio::test]
async fn test_recompute_marks_only_changed_records() {
    let env = TestEnv::new();
    let index = env.shop_index();
    let ids = env.import(&index, &products(3));
    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;

    // Sources edited without export tracking
    let mut edited_note = product("r1", "Product 1", 1.0);
    edited_note.source["internal_note"] = json!("edited");
    env.app
        .bindings
        .upsert(index.id, &[edited_note, product("r2", "Renamed", 2.0)])
        .unwrap();
    env.app
        .bindings
        .bulk_set_state(&ids, SyncState::Done, true)
        .unwrap();

    let enqueued = env
        .app
        .manager
        .recompute_all_index(&IndexFilter::all(), false)
        .unwrap();
    assert_eq!(enqueued, 3);
    let recompute_jobs = env.jobs(Some(JobStatus::Pending));
    assert!(recompute_jobs
        .iter()
        .all(|job| job.channel == CHANNEL_RECOMPUTE_JSON));
    assert_eq!(
        recompute_jobs[0].description,
        format!("Recompute json of record 'r1' for index '{}'", SHOP_INDEX_NAME)
    );

    env.drain_queue().await;

    let counts = env.counts(&index);
    assert_eq!(counts.done, 2);
    assert_eq!(counts.to_update, 1);
    assert_eq!(
        env.app.bindings.get(ids[1]).unwrap().unwrap().data,
        Some(json!({ "id": "r2", "name": "Renamed", "price": 2.0 }))
    );

    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;
    assert_eq!(
        env.shop_corpus().document("r2").unwrap(),
        Some(json!({ "id": "r2", "name": "Renamed", "price": 2.0 }))
    );
}

#[tokio::test]
async fn test_forced_recompute_marks_everything() {
    let env = TestEnv::new();
    let index = env.shop_index();
    let ids = env.import(&index, &products(2));
    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;

    assert_eq!(
        env.app.manager.recompute_binding(ids[0], false).unwrap(),
        RecomputeOutcome::Unchanged
    );

    env.app
        .manager
        .force_recompute_all(&IndexFilter::by_id(index.id))
        .unwrap();
    env.drain_queue().await;

    assert_eq!(env.counts(&index).to_update, 2);
}

// =============================================================================
// Hooks and background sweep
// =============================================================================

#[tokio::test]
async fn test_only_external_changes_fire_hook() {
    let (tx, mut rx) = mpsc::channel(16);
    let env = TestEnv::with_listener(Arc::new(HookNotifier::new(tx)));
    let index = env.shop_index();

    env.import(&index, &products(2));
    assert_eq!(rx.try_recv().unwrap(), HookEvent::OnBindingsChanged);

    // Scheduling and exporting are internal transitions
    env.app.manager.schedule_batch_export(index.id).unwrap();
    env.drain_queue().await;
    env.app.manager.force_batch_export(index.id).unwrap();
    assert!(rx.try_recv().is_err());

    // Identical records are not marked again
    env.import(&index, &products(2));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_background_sweep_exports_imported_records() {
    let (tx, rx) = mpsc::channel(16);
    let env = TestEnv::with_listener(Arc::new(HookNotifier::new(tx)));
    let index = env.shop_index();
    let shutdown = CancellationToken::new();

    let pool = Arc::new(env.app.worker_pool());
    let pool_handle = tokio::spawn(pool.run(shutdown.clone()));

    let context = JobContext::new(
        shutdown.child_token(),
        env.app.manager.clone(),
        env.app.queue.clone(),
    );
    let mut scheduler = JobScheduler::new(rx, shutdown.clone(), context);
    scheduler.register_job(Arc::new(BatchExportSweepJob::new(Duration::from_secs(3600))));
    let scheduler_handle = tokio::spawn(async move { scheduler.run().await });

    env.import(&index, &products(5));

    let deadline = Instant::now() + Duration::from_secs(10);
    while env.counts(&index).done < 5 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    shutdown.cancel();
    pool_handle.await.unwrap();
    scheduler_handle.await.unwrap();

    assert_eq!(env.counts(&index).done, 5);
    assert_eq!(env.shop_corpus().document_count().unwrap(), 5);
    let export_jobs: Vec<_> = env
        .jobs(Some(JobStatus::Done))
        .into_iter()
        .filter(|job| job.channel == CHANNEL_EXPORT)
        .collect();
    assert_eq!(export_jobs.len(), 3);
    assert!(export_jobs
        .iter()
        .all(|job| matches!(job.payload, JobPayload::ExportBatch { .. })));
}
