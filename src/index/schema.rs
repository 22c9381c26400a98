//! SQLite schema of the index database: indices and their bindings.

use crate::bindings::SE_BINDING_TABLE_V1;
use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

pub(crate) const SE_INDEX_TABLE_V1: Table = Table {
    name: "se_index",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!("name", &SqlType::Text),
        sqlite_column!("backend_id", &SqlType::Integer, non_null = true),
        sqlite_column!("lang_id", &SqlType::Integer, non_null = true),
        sqlite_column!("model_id", &SqlType::Integer, non_null = true),
        sqlite_column!("exporter_id", &SqlType::Integer),
        sqlite_column!(
            "batch_size",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("5000")
        ),
    ],
    indices: &[],
    unique_constraints: &[&["backend_id", "lang_id", "model_id"]],
};

pub static INDEX_DB_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[SE_INDEX_TABLE_V1, SE_BINDING_TABLE_V1],
    migration: None,
}];
