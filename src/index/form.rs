//! Editing rules for index configuration: which models may be selected,
//! which exporters go with a model, and what makes a configuration valid.

use super::error::IndexConfigError;
use crate::metadata::{Exporter, Metadata, ModelInfo, BINDING_BASE_MODEL};

/// Whether `model` may back an index.
pub fn is_selectable_model(model: &ModelInfo) -> bool {
    model.indexable && !model.transient && model.model != BINDING_BASE_MODEL
}

/// Models offered when choosing the model of an index.
pub fn selectable_models(metadata: &Metadata) -> Vec<&ModelInfo> {
    metadata
        .models
        .iter()
        .filter(|m| is_selectable_model(m))
        .collect()
}

/// Exporters that can serialize records of `model_id`.
pub fn exporter_choices(metadata: &Metadata, model_id: i64) -> Vec<&Exporter> {
    match metadata.model(model_id) {
        Some(model) => metadata
            .exporters
            .iter()
            .filter(|e| e.resource == model.model)
            .collect(),
        None => Vec::new(),
    }
}

/// Index configuration being edited.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexDraft {
    pub backend_id: Option<i64>,
    pub lang_id: Option<i64>,
    pub model_id: Option<i64>,
    pub exporter_id: Option<i64>,
    pub batch_size: Option<i64>,
}

impl IndexDraft {
    /// Selects a new model. Any chosen exporter is cleared and the exporters
    /// valid for the new model are returned.
    pub fn select_model<'a>(&mut self, metadata: &'a Metadata, model_id: i64) -> Vec<&'a Exporter> {
        self.model_id = Some(model_id);
        self.exporter_id = None;
        exporter_choices(metadata, model_id)
    }
}

/// Checks references and policy of a complete index configuration.
pub fn validate_config(
    metadata: &Metadata,
    backend_id: i64,
    lang_id: i64,
    model_id: i64,
    exporter_id: Option<i64>,
    batch_size: i64,
) -> Result<(), IndexConfigError> {
    if batch_size <= 0 {
        return Err(IndexConfigError::InvalidBatchSize(batch_size));
    }
    metadata
        .backend(backend_id)
        .ok_or(IndexConfigError::UnknownBackend(backend_id))?;
    metadata
        .language(lang_id)
        .ok_or(IndexConfigError::UnknownLanguage(lang_id))?;
    let model = metadata
        .model(model_id)
        .ok_or(IndexConfigError::UnknownModel(model_id))?;
    if !is_selectable_model(model) {
        return Err(IndexConfigError::ModelNotIndexable(model.model.clone()));
    }

    if let Some(exporter_id) = exporter_id {
        let exporter = metadata
            .exporter(exporter_id)
            .ok_or(IndexConfigError::UnknownExporter(exporter_id))?;
        if exporter.resource != model.model {
            return Err(IndexConfigError::ExporterModelMismatch {
                exporter: exporter.name.clone(),
                model: model.model.clone(),
            });
        }
    }
    Ok(())
}
