//! `ModelManager` — wires the registry, the admission planner, the GPU
//! oracle, the port allocator, and the backend supervisor together behind
//! `acquire()`/`preload()`/`unload()`.
//!
//! The locking discipline matches the concurrency rule this whole design
//! turns on: take the registry-wide `admission_lock` only long enough to
//! decide a plan and publish/mark the records it touches, then drop it
//! before any subprocess spawn, readiness poll, or stop wait. Two unrelated
//! models can load or unload at the same time; only the brief planning step
//! is serialized.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex as AsyncMutex;

use super::planner::AdmissionPlanner;
use super::record::{LiveRef, ModelRecord, ModelState};
use super::registry::ModelRegistry;
use crate::backend::{self, BackendError, BackendHandle, SpawnParams};
use crate::config::Settings;
use crate::gpu::{GpuError, GpuOracle, GpuSnapshot};
use crate::ports::{PortAllocator, PortError};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error("unknown model \"{0}\"")]
    UnknownModel(String),
    #[error(transparent)]
    Planner(#[from] super::planner::PlannerError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Port(#[from] PortError),
    #[error("gpu probe failed: {0}")]
    Gpu(String),
    #[error("model \"{model_id}\" has reached its concurrency limit of {limit}")]
    ConcurrencyLimitExceeded { model_id: String, limit: u32 },
    #[error("model \"{0}\" is busy")]
    Busy(String),
    #[error("model \"{model_id}\" failed to start: {reason}")]
    StartFailed { model_id: String, reason: String },
}

pub struct ModelManager {
    registry: Arc<ModelRegistry>,
    planner: AdmissionPlanner,
    gpu: Box<dyn GpuOracle>,
    ports: PortAllocator,
    settings: Settings,
    admission_lock: AsyncMutex<()>,
    handles: AsyncMutex<std::collections::HashMap<String, BackendHandle>>,
}

impl ModelManager {
    pub fn new(registry: Arc<ModelRegistry>, gpu: Box<dyn GpuOracle>, settings: Settings) -> Self {
        let ports = PortAllocator::new(settings.proxy.base_port, settings.proxy.port_range_size);
        Self {
            registry,
            planner: AdmissionPlanner::new(),
            gpu,
            ports,
            settings,
            admission_lock: AsyncMutex::new(()),
            handles: AsyncMutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn registry(&self) -> &Arc<ModelRegistry> {
        &self.registry
    }

    pub fn gpu_snapshot(&self) -> Result<GpuSnapshot, GpuError> {
        self.gpu.snapshot()
    }

    /// Admit, start-if-needed, and return a live reference to `model_id`.
    /// Loops rather than recursing: each iteration either returns, waits for
    /// an in-flight transition to settle, or (re-)attempts admission — all
    /// without holding `admission_lock` across the wait or the subprocess
    /// work that follows a successful admission decision.
    pub async fn acquire(&self, model_id: &str) -> Result<LiveRef, ManagerError> {
        if !self.registry.contains(model_id) {
            return Err(ManagerError::UnknownModel(model_id.to_string()));
        }

        loop {
            if let Some(record) = self.registry.get(model_id) {
                let state = record.state.read().await;
                match &*state {
                    ModelState::Running { port } => {
                        let port = *port;
                        drop(state);
                        return self.acquire_running(&record, port);
                    }
                    ModelState::Error(reason) => {
                        let reason = reason.clone();
                        drop(state);
                        return Err(ManagerError::StartFailed {
                            model_id: model_id.to_string(),
                            reason,
                        });
                    }
                    ModelState::Starting | ModelState::Stopping => {
                        drop(state);
                        record.wait_until_settled().await;
                        continue;
                    }
                    ModelState::Stopped => {
                        drop(state);
                        continue;
                    }
                }
            }

            match self.admit(model_id).await? {
                None => continue,
                Some((record, victims)) => {
                    for victim in &victims {
                        self.teardown(victim).await;
                    }
                    return self.spawn_and_wait(&record).await;
                }
            }
        }
    }

    /// Hand out a `LiveRef` to a model already `Running`, enforcing the
    /// per-model concurrency cap instead of silently piling requests on.
    fn acquire_running(
        &self,
        record: &Arc<ModelRecord>,
        port: u16,
    ) -> Result<LiveRef, ManagerError> {
        if record.active_requests() >= record.declaration.max_concurrent_sequences as usize {
            return Err(ManagerError::ConcurrencyLimitExceeded {
                model_id: record.declaration.id.clone(),
                limit: record.declaration.max_concurrent_sequences,
            });
        }
        Ok(LiveRef::new(record.clone(), port))
    }

    /// Plan and commit an admission decision for `model_id` under the
    /// admission lock, retrying once if the chosen eviction set races with a
    /// request that started between planning and commit. Returns `Ok(None)`
    /// if a concurrent caller already published a record for this id while
    /// we waited for the lock — the caller should loop and join it instead.
    async fn admit(
        &self,
        model_id: &str,
    ) -> Result<Option<(Arc<ModelRecord>, Vec<Arc<ModelRecord>>)>, ManagerError> {
        let _guard = self.admission_lock.lock().await;

        if self.registry.get(model_id).is_some() {
            return Ok(None);
        }

        let declaration = self
            .registry
            .declaration(model_id)
            .ok_or_else(|| ManagerError::UnknownModel(model_id.to_string()))?;

        let mut last_err = None;
        for _attempt in 0..2 {
            let snapshot = self
                .gpu
                .snapshot()
                .map_err(|e| ManagerError::Gpu(e.to_string()))?;
            let free_mb = snapshot.usable_mb(&self.settings.gpu);
            let required_mb = declaration.memory_estimate_mb;
            let candidates = self.registry.idle_running_candidates(model_id);

            let plan = match self.planner.plan(required_mb, free_mb, &candidates) {
                Ok(plan) => plan,
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            };

            // Re-verify every victim right before committing: active_requests
            // is updated without the admission lock, so a request that began
            // after planning but before now can still have claimed one.
            let mut victims = Vec::with_capacity(plan.evict.len());
            let mut raced = false;
            for id in &plan.evict {
                match self.registry.get(id) {
                    Some(victim) if victim.active_requests() == 0 => victims.push(victim),
                    _ => {
                        raced = true;
                        break;
                    }
                }
            }
            if raced {
                last_err = Some(ManagerError::Busy(model_id.to_string()));
                continue;
            }

            for victim in &victims {
                victim.set_state(ModelState::Stopping).await;
            }

            let epoch = self.registry.next_epoch(model_id);
            let record = ModelRecord::new_loading(declaration, epoch);
            self.registry.publish(model_id, record.clone());

            return Ok(Some((record, victims)));
        }

        Err(last_err.unwrap_or_else(|| ManagerError::Gpu("admission planning failed".into())))
    }

    /// Stop a backend outside the admission lock and remove its settled
    /// record, logging rather than propagating a teardown failure — the
    /// record is already committed to stopping either way.
    async fn teardown(&self, record: &Arc<ModelRecord>) {
        let model_id = record.declaration.id.clone();
        if let Some(mut handle) = self.handles.lock().await.remove(&model_id) {
            if let Err(e) = backend::stop(
                &mut handle,
                Duration::from_secs(self.settings.proxy.stop_timeout_seconds),
            )
            .await
            {
                tracing::warn!(model = %model_id, error = %e, "error stopping backend during teardown");
            }
        }
        record.set_state(ModelState::Stopped).await;
        self.registry.remove(&model_id);
    }

    /// Spawn the backend for a freshly admitted `Starting` record and wait
    /// for it to become ready, entirely outside the admission lock.
    async fn spawn_and_wait(&self, record: &Arc<ModelRecord>) -> Result<LiveRef, ManagerError> {
        let declaration = record.declaration.clone();

        let port = match self.ports.allocate() {
            Ok(port) => port,
            Err(e) => {
                record.set_state(ModelState::Error(e.to_string())).await;
                self.registry.remove(&declaration.id);
                return Err(e.into());
            }
        };

        let spawn_result = backend::spawn(SpawnParams {
            backend_path: &declaration.backend_path,
            args: &declaration.args,
            port,
            tensor_parallel_degree: declaration.tensor_parallel_degree,
            max_sequence_length: declaration.max_sequence_length,
            memory_utilization: self.settings.gpu.memory_utilization,
            model_id: &declaration.id,
        });

        let mut handle = match spawn_result {
            Ok(h) => h,
            Err(e) => {
                record.set_state(ModelState::Error(e.to_string())).await;
                self.registry.remove(&declaration.id);
                return Err(e.into());
            }
        };

        let ready = backend::wait_ready(
            &mut handle,
            Duration::from_secs(self.settings.proxy.start_timeout_seconds),
            Duration::from_millis(self.settings.proxy.readiness_interval_ms),
        )
        .await;

        if let Err(e) = ready {
            record.set_state(ModelState::Error(e.to_string())).await;
            self.registry.remove(&declaration.id);
            return Err(e.into());
        }

        self.handles.lock().await.insert(declaration.id.clone(), handle);
        record.touch();
        record.set_state(ModelState::Running { port }).await;
        Ok(LiveRef::new(record.clone(), port))
    }

    /// Ensure `model_id` is loaded without handing back a reference the
    /// caller has to release — used by `POST /admin/models/{id}/load`. The
    /// momentary reference `acquire` hands back is dropped as soon as this
    /// returns.
    pub async fn preload(&self, model_id: &str) -> Result<(), ManagerError> {
        self.acquire(model_id).await.map(|_live_ref| ())
    }

    /// Stop `model_id`. Fails with `Busy` if a request is still using it and
    /// `force` isn't set; idempotent if the model isn't currently in flight.
    pub async fn unload(&self, model_id: &str, force: bool) -> Result<(), ManagerError> {
        if !self.registry.contains(model_id) {
            return Err(ManagerError::UnknownModel(model_id.to_string()));
        }

        loop {
            let record = match self.registry.get(model_id) {
                Some(r) => r,
                None => return Ok(()),
            };

            if !force && record.active_requests() > 0 {
                return Err(ManagerError::Busy(model_id.to_string()));
            }

            {
                let state = record.state.read().await;
                if matches!(*state, ModelState::Starting | ModelState::Stopping) {
                    drop(state);
                    record.wait_until_settled().await;
                    continue;
                }
                if matches!(*state, ModelState::Stopped | ModelState::Error(_)) {
                    return Ok(());
                }
            }

            record.set_state(ModelState::Stopping).await;
            self.teardown(&record).await;
            return Ok(());
        }
    }

    /// Idle watcher sweep: unload every `Running` model with no active
    /// requests whose idle time exceeds the configured timeout. Runs with no
    /// lock held across the stop — each candidate goes through the same
    /// `unload` path an admin-triggered unload would.
    pub async fn reap_idle(&self) {
        let timeout_ms = (self.settings.proxy.idle_timeout_seconds * 1000) as i64;
        let mut candidates = Vec::new();
        for record in self.registry.all() {
            let state = record.state.read().await;
            let idle_and_running = matches!(*state, ModelState::Running { .. })
                && record.active_requests() == 0
                && record.idle_for_ms() >= timeout_ms;
            if idle_and_running {
                candidates.push(record.declaration.id.clone());
            }
        }

        for id in candidates {
            match self.unload(&id, false).await {
                Ok(()) => tracing::info!(model = %id, "reclaimed idle model"),
                Err(e) => tracing::warn!(model = %id, error = %e, "idle reap failed to stop backend"),
            }
        }
    }
}
