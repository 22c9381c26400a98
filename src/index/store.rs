use super::error::IndexConfigError;
use super::form::{validate_config, IndexDraft};
use super::models::{
    IndexFilter, IndexRename, IndexUpdate, NewIndex, SearchIndex, DEFAULT_BATCH_SIZE,
};
use super::naming::compute_name;
use super::schema::INDEX_DB_SCHEMAS;
use crate::metadata::Metadata;
use crate::sqlite_persistence::open_versioned;
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Opens the database holding indices and bindings.
///
/// Both stores share the returned connection so that writes to the two
/// tables are serialized and foreign key cascades apply.
pub fn open_index_db(db_path: &Path) -> Result<Arc<Mutex<Connection>>> {
    let conn = open_versioned(db_path, "index", INDEX_DB_SCHEMAS)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// In-memory index database with the latest schema.
pub fn open_index_db_in_memory() -> Result<Arc<Mutex<Connection>>> {
    let conn = Connection::open_in_memory()?;
    INDEX_DB_SCHEMAS
        .last()
        .context("No schemas defined")?
        .create(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Persistence of search indices.
pub trait IndexStore: Send + Sync {
    /// Creates an index after validating it against the metadata.
    fn create(&self, new_index: NewIndex) -> Result<SearchIndex, IndexConfigError>;

    /// Applies a partial update. The name is recomputed, and changing the
    /// model without naming an exporter clears the exporter.
    fn update(&self, id: i64, update: IndexUpdate) -> Result<SearchIndex, IndexConfigError>;

    /// Deletes an index and, by cascade, its bindings.
    fn delete(&self, id: i64) -> Result<bool>;

    fn get(&self, id: i64) -> Result<Option<SearchIndex>>;

    /// Indices matching `filter`, ordered by id.
    fn find(&self, filter: &IndexFilter) -> Result<Vec<SearchIndex>>;

    /// Returns the index with the same backend, language and model, creating
    /// it when missing.
    fn ensure(&self, new_index: NewIndex) -> Result<SearchIndex, IndexConfigError>;

    /// Recomputes stored names from the current metadata.
    /// Returns the indices whose name changed.
    fn refresh_names(&self) -> Result<Vec<IndexRename>>;
}

pub struct SqliteIndexStore {
    conn: Arc<Mutex<Connection>>,
    metadata: Arc<Metadata>,
}

impl SqliteIndexStore {
    pub fn new(conn: Arc<Mutex<Connection>>, metadata: Arc<Metadata>) -> Self {
        Self { conn, metadata }
    }

    fn derive_name(&self, backend_id: i64, lang_id: i64, model_id: i64) -> Option<String> {
        compute_name(
            self.metadata.backend(backend_id).map(|b| b.name.as_str()),
            self.metadata.model(model_id),
            self.metadata.language(lang_id).map(|l| l.code.as_str()),
        )
    }

    fn row_to_index(row: &rusqlite::Row) -> rusqlite::Result<SearchIndex> {
        Ok(SearchIndex {
            id: row.get("id")?,
            name: row.get("name")?,
            backend_id: row.get("backend_id")?,
            lang_id: row.get("lang_id")?,
            model_id: row.get("model_id")?,
            exporter_id: row.get("exporter_id")?,
            batch_size: row.get("batch_size")?,
        })
    }

    fn map_write_error(err: rusqlite::Error, index: &SearchIndex) -> IndexConfigError {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                IndexConfigError::DuplicateIndex {
                    backend_id: index.backend_id,
                    lang_id: index.lang_id,
                    model_id: index.model_id,
                }
            }
            _ => IndexConfigError::Storage(err.into()),
        }
    }
}

impl IndexStore for SqliteIndexStore {
    fn create(&self, new_index: NewIndex) -> Result<SearchIndex, IndexConfigError> {
        let batch_size = new_index.batch_size.unwrap_or(DEFAULT_BATCH_SIZE);
        validate_config(
            &self.metadata,
            new_index.backend_id,
            new_index.lang_id,
            new_index.model_id,
            new_index.exporter_id,
            batch_size,
        )?;

        let mut index = SearchIndex {
            id: 0,
            name: self.derive_name(new_index.backend_id, new_index.lang_id, new_index.model_id),
            backend_id: new_index.backend_id,
            lang_id: new_index.lang_id,
            model_id: new_index.model_id,
            exporter_id: new_index.exporter_id,
            batch_size,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO se_index (name, backend_id, lang_id, model_id, exporter_id, batch_size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                index.name,
                index.backend_id,
                index.lang_id,
                index.model_id,
                index.exporter_id,
                index.batch_size
            ],
        )
        .map_err(|e| Self::map_write_error(e, &index))?;
        index.id = conn.last_insert_rowid();

        info!("Created index {} ({})", index.id, index.display_name());
        Ok(index)
    }

    fn update(&self, id: i64, update: IndexUpdate) -> Result<SearchIndex, IndexConfigError> {
        let current = self.get(id)?.ok_or(IndexConfigError::NotFound(id))?;

        let mut draft = IndexDraft {
            backend_id: Some(update.backend_id.unwrap_or(current.backend_id)),
            lang_id: Some(update.lang_id.unwrap_or(current.lang_id)),
            model_id: Some(current.model_id),
            exporter_id: current.exporter_id,
            batch_size: Some(update.batch_size.unwrap_or(current.batch_size)),
        };
        if let Some(model_id) = update.model_id.filter(|m| *m != current.model_id) {
            draft.select_model(&self.metadata, model_id);
        }
        if let Some(exporter_id) = update.exporter_id {
            draft.exporter_id = exporter_id;
        }

        let backend_id = draft.backend_id.unwrap_or(current.backend_id);
        let lang_id = draft.lang_id.unwrap_or(current.lang_id);
        let model_id = draft.model_id.unwrap_or(current.model_id);
        let batch_size = draft.batch_size.unwrap_or(current.batch_size);
        validate_config(
            &self.metadata,
            backend_id,
            lang_id,
            model_id,
            draft.exporter_id,
            batch_size,
        )?;

        let index = SearchIndex {
            id,
            name: self.derive_name(backend_id, lang_id, model_id),
            backend_id,
            lang_id,
            model_id,
            exporter_id: draft.exporter_id,
            batch_size,
        };

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE se_index SET name = ?1, backend_id = ?2, lang_id = ?3, model_id = ?4,
                exporter_id = ?5, batch_size = ?6
             WHERE id = ?7",
            params![
                index.name,
                index.backend_id,
                index.lang_id,
                index.model_id,
                index.exporter_id,
                index.batch_size,
                id
            ],
        )
        .map_err(|e| Self::map_write_error(e, &index))?;

        debug!("Updated index {} ({})", id, index.display_name());
        Ok(index)
    }

    fn delete(&self, id: i64) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let deleted = conn.execute("DELETE FROM se_index WHERE id = ?1", params![id])?;
        if deleted > 0 {
            info!("Deleted index {}", id);
        }
        Ok(deleted > 0)
    }

    fn get(&self, id: i64) -> Result<Option<SearchIndex>> {
        let conn = self.conn.lock().unwrap();
        let index = conn
            .query_row(
                "SELECT * FROM se_index WHERE id = ?1",
                params![id],
                Self::row_to_index,
            )
            .optional()?;
        Ok(index)
    }

    fn find(&self, filter: &IndexFilter) -> Result<Vec<SearchIndex>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT * FROM se_index ORDER BY id")?;
        let indices = stmt
            .query_map([], Self::row_to_index)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(indices.into_iter().filter(|i| filter.matches(i)).collect())
    }

    fn ensure(&self, new_index: NewIndex) -> Result<SearchIndex, IndexConfigError> {
        let existing = self
            .find(&IndexFilter {
                backend_id: Some(new_index.backend_id),
                lang_id: Some(new_index.lang_id),
                model_id: Some(new_index.model_id),
                ..Default::default()
            })?
            .into_iter()
            .next();
        match existing {
            Some(index) => Ok(index),
            None => self.create(new_index),
        }
    }

    fn refresh_names(&self) -> Result<Vec<IndexRename>> {
        let indices = self.find(&IndexFilter::all())?;
        let conn = self.conn.lock().unwrap();
        let mut renames = Vec::new();
        for index in indices {
            let name = self.derive_name(index.backend_id, index.lang_id, index.model_id);
            if name != index.name {
                conn.execute(
                    "UPDATE se_index SET name = ?1 WHERE id = ?2",
                    params![name, index.id],
                )?;
                renames.push(IndexRename {
                    previous_name: index.name.clone(),
                    index: SearchIndex { name, ..index },
                });
            }
        }
        if !renames.is_empty() {
            info!("Refreshed {} index names", renames.len());
        }
        Ok(renames)
    }
}
