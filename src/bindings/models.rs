use serde::Serialize;
use serde_json::Value as JsonValue;

/// Export state of a binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    ToUpdate,
    Scheduled,
    Done,
    Error,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::ToUpdate => "to_update",
            SyncState::Scheduled => "scheduled",
            SyncState::Done => "done",
            SyncState::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "to_update" => Some(SyncState::ToUpdate),
            "scheduled" => Some(SyncState::Scheduled),
            "done" => Some(SyncState::Done),
            "error" => Some(SyncState::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lightweight reference returned by binding queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindingRef {
    pub id: i64,
    pub record_id: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub id: i64,
    pub index_id: i64,
    pub record_id: String,
    pub sync_state: SyncState,
    /// Fields of the business record.
    pub source: JsonValue,
    /// Last computed export payload.
    pub data: Option<JsonValue>,
    pub updated_at: i64,
}

/// Business record to bind to an index.
#[derive(Debug, Clone)]
pub struct NewBinding {
    pub record_id: String,
    pub source: JsonValue,
}

#[derive(Debug, Clone, Default)]
pub struct BindingFilter {
    pub index_id: Option<i64>,
    pub sync_state: Option<SyncState>,
}

impl BindingFilter {
    pub fn to_export(index_id: i64) -> Self {
        Self {
            index_id: Some(index_id),
            sync_state: Some(SyncState::ToUpdate),
        }
    }

    pub fn of_index(index_id: i64) -> Self {
        Self {
            index_id: Some(index_id),
            sync_state: None,
        }
    }
}

/// Number of bindings of an index per state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateCounts {
    pub to_update: usize,
    pub scheduled: usize,
    pub done: usize,
    pub error: usize,
}

impl StateCounts {
    pub fn total(&self) -> usize {
        self.to_update + self.scheduled + self.done + self.error
    }

    pub(crate) fn add(&mut self, state: SyncState, count: usize) {
        match state {
            SyncState::ToUpdate => self.to_update += count,
            SyncState::Scheduled => self.scheduled += count,
            SyncState::Done => self.done += count,
            SyncState::Error => self.error += count,
        }
    }
}
