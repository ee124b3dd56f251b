//! `ModelDeclaration` — the static, operator-authored description of a model
//! backend, derived from its `[models.<id>]` config section.

use crate::config::{ModelSettings, Precision};
use crate::gpu::estimate_memory_mb;

#[derive(Debug, Clone)]
pub struct ModelDeclaration {
    pub id: String,
    pub backend_path: String,
    pub args: Vec<String>,
    pub parameter_count_billions: f64,
    pub precision: Precision,
    pub max_sequence_length: u32,
    pub max_concurrent_sequences: u32,
    pub tensor_parallel_degree: u32,
    pub memory_estimate_mb: u64,
    pub credential: String,
    pub label: String,
    pub tags: Vec<String>,
}

impl ModelDeclaration {
    pub fn from_settings(id: &str, settings: &ModelSettings) -> Self {
        Self {
            id: id.to_string(),
            backend_path: settings.backend_path.clone(),
            args: settings.args.clone(),
            parameter_count_billions: settings.parameter_count_billions,
            precision: settings.precision,
            max_sequence_length: settings.max_sequence_length,
            max_concurrent_sequences: settings.max_concurrent_sequences,
            tensor_parallel_degree: settings.tensor_parallel_degree,
            memory_estimate_mb: estimate_memory_mb(settings),
            credential: settings.credential.clone(),
            label: settings.label.clone().unwrap_or_else(|| id.to_string()),
            tags: settings.tags.clone(),
        }
    }
}
