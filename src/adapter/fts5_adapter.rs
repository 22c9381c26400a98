//! Local search backend storing each index in an SQLite FTS5 table.

use super::{ExportRecord, SearchAdapter};
use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};
use tracing::debug;

pub struct Fts5Adapter {
    conn: Arc<Mutex<Connection>>,
    table: String,
}

impl Fts5Adapter {
    /// Binds the adapter to the table named after the index, creating it if
    /// needed. The connection may be shared by the adapters of several indices.
    pub fn new(conn: Arc<Mutex<Connection>>, index_name: &str) -> Result<Self> {
        let table = format!("\"{}\"", index_name.replace('"', "\"\""));
        {
            let conn = conn.lock().unwrap();
            conn.execute_batch(&format!(
                r#"
                CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                    record_id UNINDEXED,
                    body,
                    payload UNINDEXED,
                    tokenize='trigram'
                );
            "#,
                table
            ))
            .with_context(|| format!("Failed to create FTS5 table for index '{}'", index_name))?;
        }
        Ok(Self { conn, table })
    }

    /// Opens a corpus file for use by FTS5 adapters.
    pub fn open_corpus(path: &std::path::Path) -> Result<Arc<Mutex<Connection>>> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open search corpus at {:?}", path))?;
        // Enable WAL mode for better concurrent access
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Ok(Arc::new(Mutex::new(conn)))
    }

    pub fn document_count(&self) -> Result<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Stored payload of a document.
    pub fn document(&self, record_id: &str) -> Result<Option<JsonValue>> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                &format!("SELECT payload FROM {} WHERE record_id = ?1", self.table),
                params![record_id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|p| serde_json::from_str(&p).context("Corrupted document payload"))
            .transpose()
    }

    /// Searchable text of a payload: its scalar values joined by spaces.
    fn body_of(value: &JsonValue, out: &mut Vec<String>) {
        match value {
            JsonValue::String(s) => out.push(s.clone()),
            JsonValue::Number(n) => out.push(n.to_string()),
            JsonValue::Array(items) => items.iter().for_each(|v| Self::body_of(v, out)),
            JsonValue::Object(map) => map.values().for_each(|v| Self::body_of(v, out)),
            JsonValue::Bool(_) | JsonValue::Null => {}
        }
    }
}

impl SearchAdapter for Fts5Adapter {
    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        let removed = conn.execute(&format!("DELETE FROM {}", self.table), [])?;
        debug!("Cleared {} documents from {}", removed, self.table);
        Ok(())
    }

    fn export(&self, records: &[ExportRecord]) -> Result<usize> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut delete = tx.prepare(&format!("DELETE FROM {} WHERE record_id = ?1", self.table))?;
            let mut insert = tx.prepare(&format!(
                "INSERT INTO {} (record_id, body, payload) VALUES (?1, ?2, ?3)",
                self.table
            ))?;
            for record in records {
                let mut body = Vec::new();
                Self::body_of(&record.payload, &mut body);
                delete.execute(params![record.record_id])?;
                insert.execute(params![
                    record.record_id,
                    body.join(" "),
                    serde_json::to_string(&record.payload)?
                ])?;
            }
        }
        tx.commit()?;
        debug!("Exported {} documents to {}", records.len(), self.table);
        Ok(records.len())
    }
}
