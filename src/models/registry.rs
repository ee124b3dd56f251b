//! `ModelRegistry` — declarations live for the process lifetime; records are
//! ephemeral, present only while a model is somewhere between `Starting` and
//! `Stopping`, and removed once it settles back to `Stopped`/`Error`.
//!
//! Read-only projections (`list_for_api`, `detail_for_api`,
//! `snapshot_for_metrics`) iterate declarations and overlay whatever record
//! currently exists; the only write paths (`publish`/`remove`/`next_epoch`)
//! belong to `ModelManager`, which always takes the admission lock before
//! touching the map.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use super::declaration::ModelDeclaration;
use super::record::{ModelRecord, ModelState};
use crate::config::Settings;

pub struct ModelRegistry {
    declarations: HashMap<String, ModelDeclaration>,
    records: DashMap<String, Arc<ModelRecord>>,
    epochs: DashMap<String, AtomicU64>,
}

impl ModelRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut declarations = HashMap::new();
        let epochs = DashMap::new();
        for (id, model_settings) in &settings.models {
            declarations.insert(id.clone(), ModelDeclaration::from_settings(id, model_settings));
            epochs.insert(id.clone(), AtomicU64::new(0));
        }
        Self {
            declarations,
            records: DashMap::new(),
            epochs,
        }
    }

    pub fn declaration(&self, id: &str) -> Option<ModelDeclaration> {
        self.declarations.get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.declarations.contains_key(id)
    }

    /// The record currently tracking `id`'s load attempt, if any — absent
    /// means the model is conceptually `Stopped` with nothing in flight.
    pub fn get(&self, id: &str) -> Option<Arc<ModelRecord>> {
        self.records.get(id).map(|r| r.clone())
    }

    /// Every record currently in flight (`Starting`/`Running`/`Stopping`).
    /// Used by the eviction planner and the idle reaper — never includes a
    /// declared-but-never-loaded or already-settled model.
    pub fn all(&self) -> Vec<Arc<ModelRecord>> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }

    /// Candidates the admission planner may evict to make room for `excluding`.
    pub fn idle_running_candidates(&self, excluding: &str) -> Vec<Arc<ModelRecord>> {
        self.records
            .iter()
            .filter(|r| r.key() != excluding)
            .map(|r| r.value().clone())
            .collect()
    }

    /// Publish a freshly created `Starting` record, replacing nothing — the
    /// caller (`ModelManager::admit`) only calls this once it has confirmed
    /// under the admission lock that no record for this id already exists.
    pub(crate) fn publish(&self, id: &str, record: Arc<ModelRecord>) {
        self.records.insert(id.to_string(), record);
    }

    /// Remove the settled (`Stopped`/`Error`) record so the next `acquire`
    /// starts a fresh load attempt instead of reusing terminal state.
    pub(crate) fn remove(&self, id: &str) {
        self.records.remove(id);
    }

    /// Bump and return this id's load epoch, used to tag the next fresh record.
    pub(crate) fn next_epoch(&self, id: &str) -> u64 {
        self.epochs
            .entry(id.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    /// `/v1/models` listing projection: every declared model, overlaid with
    /// its current runtime record if one exists.
    pub async fn list_for_api(&self) -> Vec<ModelApiEntry> {
        let mut out = Vec::with_capacity(self.declarations.len());
        for (id, declaration) in &self.declarations {
            let record = self.records.get(id).map(|r| r.value().clone());
            out.push(ModelApiEntry::build(id, declaration, record.as_deref_record()).await);
        }
        out
    }

    /// `/v1/models/{id}` detail projection; `None` if the id isn't declared.
    pub async fn detail_for_api(&self, id: &str) -> Option<ModelDetailEntry> {
        let declaration = self.declarations.get(id)?;
        let record = self.records.get(id).map(|r| r.value().clone());
        Some(ModelDetailEntry::build(id, declaration, record).await)
    }

    /// Prometheus exporter projection: one row per declared model.
    pub async fn snapshot_for_metrics(&self) -> Vec<ModelMetricsEntry> {
        let mut out = Vec::with_capacity(self.declarations.len());
        for id in self.declarations.keys() {
            let record = self.records.get(id).map(|r| r.value().clone());
            let (running, active_requests) = match &record {
                Some(r) => (
                    matches!(*r.state.read().await, ModelState::Running { .. }),
                    r.active_requests(),
                ),
                None => (false, 0),
            };
            out.push(ModelMetricsEntry {
                id: id.clone(),
                active_requests,
                running,
            });
        }
        out
    }
}

/// Helper so `list_for_api` can pass an `Option<&Arc<ModelRecord>>` without
/// cloning twice.
trait AsOptRecord {
    fn as_deref_record(&self) -> Option<&ModelRecord>;
}
impl AsOptRecord for Option<Arc<ModelRecord>> {
    fn as_deref_record(&self) -> Option<&ModelRecord> {
        self.as_deref()
    }
}

fn status_of(state: &ModelState) -> &'static str {
    match state {
        ModelState::Stopped => "stopped",
        ModelState::Starting => "starting",
        ModelState::Running { .. } => "running",
        ModelState::Stopping => "stopping",
        ModelState::Error(_) => "error",
    }
}

pub struct ModelApiEntry {
    pub id: String,
    pub label: String,
    pub tags: Vec<String>,
    pub status: String,
    pub port: Option<u16>,
    pub active_requests: usize,
}

impl ModelApiEntry {
    async fn build(id: &str, declaration: &ModelDeclaration, record: Option<&ModelRecord>) -> Self {
        let (status, port, active_requests) = match record {
            Some(r) => {
                let state = r.state.read().await;
                let port = match &*state {
                    ModelState::Running { port } => Some(*port),
                    _ => None,
                };
                (status_of(&state).to_string(), port, r.active_requests())
            }
            None => ("stopped".to_string(), None, 0),
        };
        Self {
            id: id.to_string(),
            label: declaration.label.clone(),
            tags: declaration.tags.clone(),
            status,
            port,
            active_requests,
        }
    }
}

pub struct ModelDetailEntry {
    pub id: String,
    pub label: String,
    pub tags: Vec<String>,
    pub status: String,
    pub port: Option<u16>,
    pub active_requests: usize,
    pub idle_seconds: Option<i64>,
    pub last_used_at_ms: Option<i64>,
}

impl ModelDetailEntry {
    async fn build(id: &str, declaration: &ModelDeclaration, record: Option<Arc<ModelRecord>>) -> Self {
        let (status, port, active_requests, idle_seconds, last_used_at_ms) = match &record {
            Some(r) => {
                let state = r.state.read().await;
                let port = match &*state {
                    ModelState::Running { port } => Some(*port),
                    _ => None,
                };
                (
                    status_of(&state).to_string(),
                    port,
                    r.active_requests(),
                    Some(r.idle_for_ms() / 1000),
                    Some(r.last_used_ms()),
                )
            }
            None => ("stopped".to_string(), None, 0, None, None),
        };
        Self {
            id: id.to_string(),
            label: declaration.label.clone(),
            tags: declaration.tags.clone(),
            status,
            port,
            active_requests,
            idle_seconds,
            last_used_at_ms,
        }
    }
}

pub struct ModelMetricsEntry {
    pub id: String,
    pub active_requests: usize,
    pub running: bool,
}
