//! Full scheduler environment over a temporary directory

#![allow(dead_code)]

use super::constants::*;
use super::fixtures::write_test_config;
use search_export_scheduler::adapter::Fts5Adapter;
use search_export_scheduler::bindings::{
    BindingChangeListener, BindingFilter, BindingStore, NewBinding, StateCounts,
};
use search_export_scheduler::config::{AppConfig, CliConfig, FileConfig};
use search_export_scheduler::index::{IndexFilter, IndexStore, SearchIndex};
use search_export_scheduler::job_queue::{JobStatus, QueueStore, QueuedJob};
use search_export_scheduler::App;
use std::sync::Arc;
use tempfile::TempDir;

pub struct TestEnv {
    // Keeps the databases alive
    pub dir: TempDir,
    pub app: App,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::open(None)
    }

    pub fn with_listener(listener: Arc<dyn BindingChangeListener>) -> Self {
        Self::open(Some(listener))
    }

    fn open(listener: Option<Arc<dyn BindingChangeListener>>) -> Self {
        let dir = TempDir::new().unwrap();
        let config_path = write_test_config(dir.path()).unwrap();
        let cli = CliConfig {
            db_dir: Some(dir.path().to_path_buf()),
            metrics_port: 0,
        };
        let config =
            AppConfig::resolve(&cli, Some(FileConfig::load(&config_path).unwrap())).unwrap();
        let app = App::open(config, listener).unwrap();
        app.sync_indices().unwrap();
        Self { dir, app }
    }

    /// Opens a second application over the same databases, with the
    /// fixture config passed through `edit`.
    pub fn reopen_with(&self, edit: impl FnOnce(String) -> String) -> App {
        let config_path = write_test_config(self.dir.path()).unwrap();
        let edited = edit(std::fs::read_to_string(&config_path).unwrap());
        std::fs::write(&config_path, edited).unwrap();

        let cli = CliConfig {
            db_dir: Some(self.dir.path().to_path_buf()),
            metrics_port: 0,
        };
        let config =
            AppConfig::resolve(&cli, Some(FileConfig::load(&config_path).unwrap())).unwrap();
        let app = App::open(config, None).unwrap();
        app.sync_indices().unwrap();
        app
    }

    /// The index declared by the fixture config.
    pub fn shop_index(&self) -> SearchIndex {
        self.app
            .indices
            .find(&IndexFilter::all())
            .unwrap()
            .into_iter()
            .find(|i| i.name.as_deref() == Some(SHOP_INDEX_NAME))
            .unwrap()
    }

    /// Binds records to an index and returns the ids of all its bindings.
    pub fn import(&self, index: &SearchIndex, records: &[NewBinding]) -> Vec<i64> {
        self.app.bindings.upsert(index.id, records).unwrap();
        self.binding_ids(index)
    }

    pub fn binding_ids(&self, index: &SearchIndex) -> Vec<i64> {
        self.app
            .bindings
            .find(&BindingFilter::of_index(index.id))
            .unwrap()
            .iter()
            .map(|b| b.id)
            .collect()
    }

    pub fn counts(&self, index: &SearchIndex) -> StateCounts {
        self.app.bindings.state_counts(index.id).unwrap()
    }

    /// Queue jobs in enqueue order.
    pub fn jobs(&self, status: Option<JobStatus>) -> Vec<QueuedJob> {
        let mut jobs = self.app.queue.list(status, 1000).unwrap();
        jobs.reverse();
        jobs
    }

    /// Runs every due queue job to completion, including the jobs they
    /// enqueue.
    pub async fn drain_queue(&self) -> usize {
        self.app.worker_pool().drain().await.unwrap()
    }

    /// Adapter reading the shop corpus through its own connection.
    pub fn shop_corpus(&self) -> Fts5Adapter {
        let conn = Fts5Adapter::open_corpus(&self.dir.path().join("shop_corpus.db")).unwrap();
        Fts5Adapter::new(conn, SHOP_INDEX_NAME).unwrap()
    }
}
