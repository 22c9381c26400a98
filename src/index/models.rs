use serde::Serialize;

pub const DEFAULT_BATCH_SIZE: i64 = 5000;

/// A search index: the records of one model, in one language, on one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchIndex {
    pub id: i64,
    /// Derived from backend, model and language. `None` while any is unknown.
    pub name: Option<String>,
    pub backend_id: i64,
    pub lang_id: i64,
    pub model_id: i64,
    pub exporter_id: Option<i64>,
    pub batch_size: i64,
}

impl SearchIndex {
    /// Name for messages, falling back to the id when no name is derived.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("#{}", self.id))
    }
}

/// An index whose derived name changed with the metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRename {
    /// The index, carrying its new name.
    pub index: SearchIndex,
    pub previous_name: Option<String>,
}

impl IndexRename {
    /// The index as the search backend still knows it.
    pub fn previous(&self) -> SearchIndex {
        SearchIndex {
            name: self.previous_name.clone(),
            ..self.index.clone()
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewIndex {
    pub backend_id: i64,
    pub lang_id: i64,
    pub model_id: i64,
    pub exporter_id: Option<i64>,
    pub batch_size: Option<i64>,
}

/// Partial update of an index. `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct IndexUpdate {
    pub backend_id: Option<i64>,
    pub lang_id: Option<i64>,
    pub model_id: Option<i64>,
    /// `Some(None)` removes the exporter.
    pub exporter_id: Option<Option<i64>>,
    pub batch_size: Option<i64>,
}

/// Selects indices. Empty filter selects all of them.
#[derive(Debug, Clone, Default)]
pub struct IndexFilter {
    pub ids: Option<Vec<i64>>,
    pub backend_id: Option<i64>,
    pub model_id: Option<i64>,
    pub lang_id: Option<i64>,
}

impl IndexFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: i64) -> Self {
        Self {
            ids: Some(vec![id]),
            ..Default::default()
        }
    }

    pub fn matches(&self, index: &SearchIndex) -> bool {
        self.ids.as_ref().map_or(true, |ids| ids.contains(&index.id))
            && self.backend_id.map_or(true, |id| id == index.backend_id)
            && self.model_id.map_or(true, |id| id == index.model_id)
            && self.lang_id.map_or(true, |id| id == index.lang_id)
    }
}
