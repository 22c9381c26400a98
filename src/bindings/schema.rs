use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, ForeignKeyOnChange, SqlType, Table};

const INDEX_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: "se_index",
    foreign_column: "id",
    on_delete: ForeignKeyOnChange::Cascade,
};

/// Exportable records. The integer primary key gives the retrieval order.
pub const SE_BINDING_TABLE_V1: Table = Table {
    name: "se_binding",
    columns: &[
        sqlite_column!("id", &SqlType::Integer, is_primary_key = true),
        sqlite_column!(
            "index_id",
            &SqlType::Integer,
            non_null = true,
            foreign_key = Some(&INDEX_FOREIGN_KEY)
        ),
        sqlite_column!("record_id", &SqlType::Text, non_null = true),
        sqlite_column!(
            "sync_state",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'to_update'")
        ),
        sqlite_column!("source", &SqlType::Text, non_null = true),
        sqlite_column!("data", &SqlType::Text),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
    ],
    indices: &[("idx_se_binding_index_state", "index_id, sync_state")],
    unique_constraints: &[&["index_id", "record_id"]],
};
