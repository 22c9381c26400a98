//! Static description of the search backends, languages, models and
//! exporters an index can refer to.
//!
//! The registry is loaded from the TOML configuration and is read-only at
//! runtime.

use serde::Deserialize;
use std::path::PathBuf;

/// Technical name of the binding base model, never selectable for an index.
pub const BINDING_BASE_MODEL: &str = "se.binding";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local SQLite FTS5 corpus.
    Fts5,
    /// Accepts everything, stores nothing.
    Noop,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Backend {
    pub id: i64,
    pub name: String,
    pub kind: BackendKind,
    /// Corpus file for `fts5` backends.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Language {
    pub id: i64,
    /// Locale code such as `en_US`.
    pub code: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelInfo {
    pub id: i64,
    /// Technical name, e.g. `product.template`.
    pub model: String,
    /// Display name, e.g. `Product Template`.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub indexable: bool,
    #[serde(default)]
    pub transient: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Exporter {
    pub id: i64,
    pub name: String,
    /// Technical name of the model this exporter reads.
    pub resource: String,
    /// Record fields copied into the export payload. Empty means all fields.
    #[serde(default)]
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Metadata {
    pub backends: Vec<Backend>,
    pub languages: Vec<Language>,
    pub models: Vec<ModelInfo>,
    pub exporters: Vec<Exporter>,
}

impl Metadata {
    pub fn backend(&self, id: i64) -> Option<&Backend> {
        self.backends.iter().find(|b| b.id == id)
    }

    pub fn language(&self, id: i64) -> Option<&Language> {
        self.languages.iter().find(|l| l.id == id)
    }

    pub fn model(&self, id: i64) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.id == id)
    }

    pub fn exporter(&self, id: i64) -> Option<&Exporter> {
        self.exporters.iter().find(|e| e.id == id)
    }

    pub fn backend_by_name(&self, name: &str) -> Option<&Backend> {
        self.backends.iter().find(|b| b.name == name)
    }

    pub fn language_by_code(&self, code: &str) -> Option<&Language> {
        self.languages.iter().find(|l| l.code == code)
    }

    pub fn model_by_name(&self, model: &str) -> Option<&ModelInfo> {
        self.models.iter().find(|m| m.model == model)
    }
}
