use super::models::{Binding, BindingFilter, BindingRef, NewBinding, StateCounts, SyncState};
use anyhow::{Context, Result};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, ToSql};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Maximum number of ids bound in a single statement.
const IDS_PER_STATEMENT: usize = 900;

/// Notified when bindings are marked `to_update` by a write that does not
/// suppress cascading work.
pub trait BindingChangeListener: Send + Sync {
    fn bindings_marked_to_update(&self, count: usize);
}

/// Record store for exportable bindings.
pub trait BindingStore: Send + Sync {
    /// Bindings matching `filter`, in id order.
    fn find(&self, filter: &BindingFilter) -> Result<Vec<BindingRef>>;

    /// Sets the state of the given bindings in one transaction.
    /// Returns the number of rows written.
    fn bulk_set_state(&self, ids: &[i64], state: SyncState, suppress_cascade: bool)
        -> Result<usize>;

    /// Moves the given bindings from `from` to `to` in one transaction.
    /// Bindings in any other state are left untouched.
    /// Returns the number of rows written.
    fn transition_state(
        &self,
        ids: &[i64],
        from: SyncState,
        to: SyncState,
        suppress_cascade: bool,
    ) -> Result<usize>;

    /// Sets the state of every binding of an index in one statement.
    fn set_state_for_index(
        &self,
        index_id: i64,
        state: SyncState,
        suppress_cascade: bool,
    ) -> Result<usize>;

    fn get(&self, id: i64) -> Result<Option<Binding>>;

    /// Bindings for `ids`, in the order of `ids`. Unknown ids are skipped.
    fn get_many(&self, ids: &[i64]) -> Result<Vec<Binding>>;

    /// Inserts or updates the records of an index. New records and records
    /// whose source changed are marked `to_update`.
    /// Returns how many bindings were marked.
    fn upsert(&self, index_id: i64, records: &[NewBinding]) -> Result<usize>;

    /// Saves the computed export payload of a binding.
    fn store_payload(&self, id: i64, data: &JsonValue) -> Result<()>;

    fn state_counts(&self, index_id: i64) -> Result<StateCounts>;
}

pub struct SqliteBindingStore {
    conn: Arc<Mutex<Connection>>,
    listener: Option<Arc<dyn BindingChangeListener>>,
}

impl SqliteBindingStore {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            listener: None,
        }
    }

    pub fn with_listener(mut self, listener: Arc<dyn BindingChangeListener>) -> Self {
        self.listener = Some(listener);
        self
    }

    fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    fn notify(&self, state: SyncState, suppress_cascade: bool, count: usize) {
        if suppress_cascade || state != SyncState::ToUpdate || count == 0 {
            return;
        }
        if let Some(listener) = &self.listener {
            listener.bindings_marked_to_update(count);
        }
    }

    fn parse_json(text: &str) -> rusqlite::Result<JsonValue> {
        serde_json::from_str(text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))
    }

    fn row_to_binding(row: &rusqlite::Row) -> rusqlite::Result<Binding> {
        let state: String = row.get("sync_state")?;
        let sync_state = SyncState::parse(&state).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                0,
                Type::Text,
                format!("Unknown sync state '{}'", state).into(),
            )
        })?;
        let source: String = row.get("source")?;
        let data: Option<String> = row.get("data")?;

        Ok(Binding {
            id: row.get("id")?,
            index_id: row.get("index_id")?,
            record_id: row.get("record_id")?,
            sync_state,
            source: Self::parse_json(&source)?,
            data: data.as_deref().map(Self::parse_json).transpose()?,
            updated_at: row.get("updated_at")?,
        })
    }

    /// Writes `state` on `ids`, restricted to rows currently in `from` when
    /// given.
    fn set_state(
        &self,
        ids: &[i64],
        from: Option<SyncState>,
        state: SyncState,
        suppress_cascade: bool,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let state_str = state.as_str();
        let from_str = from.map(|s| s.as_str());
        let now = Self::now();
        let mut updated = 0;
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            for chunk in ids.chunks(IDS_PER_STATEMENT) {
                let sql = format!(
                    "UPDATE se_binding SET sync_state = ?1, updated_at = ?2
                     WHERE (?3 IS NULL OR sync_state = ?3) AND id IN ({})",
                    Self::placeholders(4, chunk.len())
                );
                let mut values: Vec<&dyn ToSql> = vec![&state_str, &now, &from_str];
                values.extend(chunk.iter().map(|id| id as &dyn ToSql));
                updated += tx.execute(&sql, values.as_slice())?;
            }
            tx.commit()
                .with_context(|| format!("Failed to mark {} bindings {}", ids.len(), state))?;
        }

        debug!(
            "Marked {} bindings {} (suppress_cascade: {})",
            updated, state, suppress_cascade
        );
        self.notify(state, suppress_cascade, updated);
        Ok(updated)
    }

    fn placeholders(start: usize, count: usize) -> String {
        (start..start + count)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl BindingStore for SqliteBindingStore {
    fn find(&self, filter: &BindingFilter) -> Result<Vec<BindingRef>> {
        let state = filter.sync_state.map(|s| s.as_str());
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, record_id FROM se_binding
             WHERE (?1 IS NULL OR index_id = ?1) AND (?2 IS NULL OR sync_state = ?2)
             ORDER BY id",
        )?;
        let refs = stmt
            .query_map(params![filter.index_id, state], |row| {
                Ok(BindingRef {
                    id: row.get(0)?,
                    record_id: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(refs)
    }

    fn bulk_set_state(
        &self,
        ids: &[i64],
        state: SyncState,
        suppress_cascade: bool,
    ) -> Result<usize> {
        self.set_state(ids, None, state, suppress_cascade)
    }

    fn transition_state(
        &self,
        ids: &[i64],
        from: SyncState,
        to: SyncState,
        suppress_cascade: bool,
    ) -> Result<usize> {
        let updated = self.set_state(ids, Some(from), to, suppress_cascade)?;
        if updated < ids.len() {
            debug!(
                "{} of {} bindings were no longer {}, left as they are",
                ids.len() - updated,
                ids.len(),
                from
            );
        }
        Ok(updated)
    }

    fn set_state_for_index(
        &self,
        index_id: i64,
        state: SyncState,
        suppress_cascade: bool,
    ) -> Result<usize> {
        let updated = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE se_binding SET sync_state = ?1, updated_at = ?2 WHERE index_id = ?3",
                params![state.as_str(), Self::now(), index_id],
            )?
        };
        debug!(
            "Marked all {} bindings of index {} {}",
            updated, index_id, state
        );
        self.notify(state, suppress_cascade, updated);
        Ok(updated)
    }

    fn get(&self, id: i64) -> Result<Option<Binding>> {
        let conn = self.conn.lock().unwrap();
        let binding = conn
            .query_row(
                "SELECT * FROM se_binding WHERE id = ?1",
                params![id],
                Self::row_to_binding,
            )
            .optional()?;
        Ok(binding)
    }

    fn get_many(&self, ids: &[i64]) -> Result<Vec<Binding>> {
        let mut by_id = HashMap::with_capacity(ids.len());
        {
            let conn = self.conn.lock().unwrap();
            for chunk in ids.chunks(IDS_PER_STATEMENT) {
                let sql = format!(
                    "SELECT * FROM se_binding WHERE id IN ({})",
                    Self::placeholders(1, chunk.len())
                );
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt.query_map(rusqlite::params_from_iter(chunk), Self::row_to_binding)?;
                for binding in rows {
                    let binding = binding?;
                    by_id.insert(binding.id, binding);
                }
            }
        }

        let bindings: Vec<Binding> = ids.iter().filter_map(|id| by_id.remove(id)).collect();
        if bindings.len() < ids.len() {
            warn!(
                "{} of {} requested bindings no longer exist",
                ids.len() - bindings.len(),
                ids.len()
            );
        }
        Ok(bindings)
    }

    fn upsert(&self, index_id: i64, records: &[NewBinding]) -> Result<usize> {
        let now = Self::now();
        let mut marked = 0;
        {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction()?;
            for record in records {
                let source = serde_json::to_string(&record.source)?;
                let existing: Option<(i64, String)> = tx
                    .query_row(
                        "SELECT id, source FROM se_binding WHERE index_id = ?1 AND record_id = ?2",
                        params![index_id, record.record_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                match existing {
                    None => {
                        tx.execute(
                            "INSERT INTO se_binding (index_id, record_id, sync_state, source, updated_at)
                             VALUES (?1, ?2, ?3, ?4, ?5)",
                            params![
                                index_id,
                                record.record_id,
                                SyncState::ToUpdate.as_str(),
                                source,
                                now
                            ],
                        )
                        .with_context(|| {
                            format!("Failed to bind record {} to index {}", record.record_id, index_id)
                        })?;
                        marked += 1;
                    }
                    Some((_, old_source)) if old_source == source => {}
                    Some((id, _)) => {
                        tx.execute(
                            "UPDATE se_binding SET source = ?1, sync_state = ?2, updated_at = ?3
                             WHERE id = ?4",
                            params![source, SyncState::ToUpdate.as_str(), now, id],
                        )?;
                        marked += 1;
                    }
                }
            }
            tx.commit()?;
        }

        debug!(
            "Upserted {} records into index {}, {} marked to_update",
            records.len(),
            index_id,
            marked
        );
        self.notify(SyncState::ToUpdate, false, marked);
        Ok(marked)
    }

    fn store_payload(&self, id: i64, data: &JsonValue) -> Result<()> {
        let data = serde_json::to_string(data)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE se_binding SET data = ?1, updated_at = ?2 WHERE id = ?3",
            params![data, Self::now(), id],
        )?;
        Ok(())
    }

    fn state_counts(&self, index_id: i64) -> Result<StateCounts> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT sync_state, COUNT(*) FROM se_binding WHERE index_id = ?1 GROUP BY sync_state",
        )?;
        let rows = stmt.query_map(params![index_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut counts = StateCounts::default();
        for row in rows {
            let (state, count) = row?;
            match SyncState::parse(&state) {
                Some(state) => counts.add(state, count as usize),
                None => warn!("Ignoring bindings with unknown state '{}'", state),
            }
        }
        Ok(counts)
    }
}
