use super::models::Binding;
use crate::index::SearchIndex;
use crate::metadata::Metadata;
use anyhow::{Context, Result};
use serde_json::{Map, Value as JsonValue};
use std::sync::Arc;

/// Computes the document sent to the search backend for a binding.
pub trait PayloadComputer: Send + Sync {
    fn compute(&self, index: &SearchIndex, binding: &Binding) -> Result<JsonValue>;
}

/// Projects the record's source onto the fields of the index exporter.
///
/// Without an exporter, or with an exporter listing no fields, the whole
/// source is exported. The record id is always included as `id`.
pub struct ExporterPayload {
    metadata: Arc<Metadata>,
}

impl ExporterPayload {
    pub fn new(metadata: Arc<Metadata>) -> Self {
        Self { metadata }
    }
}

impl PayloadComputer for ExporterPayload {
    fn compute(&self, index: &SearchIndex, binding: &Binding) -> Result<JsonValue> {
        let source = binding
            .source
            .as_object()
            .with_context(|| format!("Source of record {} is not an object", binding.record_id))?;

        let fields: &[String] = match index.exporter_id {
            Some(exporter_id) => {
                let exporter = self
                    .metadata
                    .exporter(exporter_id)
                    .with_context(|| format!("Unknown exporter {}", exporter_id))?;
                exporter.fields.as_slice()
            }
            None => &[],
        };

        let mut payload = Map::new();
        payload.insert("id".to_string(), JsonValue::String(binding.record_id.clone()));
        if fields.is_empty() {
            for (key, value) in source {
                payload.insert(key.clone(), value.clone());
            }
        } else {
            for field in fields {
                let value = source.get(field).cloned().unwrap_or(JsonValue::Null);
                payload.insert(field.clone(), value);
            }
        }
        Ok(JsonValue::Object(payload))
    }
}
