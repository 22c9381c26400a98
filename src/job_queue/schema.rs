use crate::sqlite_column;
use crate::sqlite_persistence::{Column, SqlType, Table, VersionedSchema};

const QUEUE_JOB_TABLE_V1: Table = Table {
    name: "queue_job",
    columns: &[
        sqlite_column!("uuid", &SqlType::Text, is_primary_key = true),
        sqlite_column!("channel", &SqlType::Text, non_null = true),
        sqlite_column!("description", &SqlType::Text, non_null = true),
        sqlite_column!("payload", &SqlType::Text, non_null = true),
        sqlite_column!(
            "status",
            &SqlType::Text,
            non_null = true,
            default_value = Some("'pending'")
        ),
        sqlite_column!(
            "attempts",
            &SqlType::Integer,
            non_null = true,
            default_value = Some("0")
        ),
        sqlite_column!("max_retries", &SqlType::Integer, non_null = true),
        sqlite_column!("eta", &SqlType::Integer, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("started_at", &SqlType::Integer),
        sqlite_column!("finished_at", &SqlType::Integer),
        sqlite_column!("error", &SqlType::Text),
    ],
    indices: &[
        ("idx_queue_job_status_eta", "status, eta"),
        ("idx_queue_job_channel", "channel"),
    ],
    unique_constraints: &[],
};

pub static JOB_QUEUE_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[QUEUE_JOB_TABLE_V1],
    migration: None,
}];
