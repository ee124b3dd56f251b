//! `ModelRecord` — the live, mutable state tracked per declared model.
//!
//! `active_requests` and `last_used_ms` are plain atomics so the eviction
//! planner can read them without taking the record's state lock — only state
//! *transitions* (Stopped -> Starting -> Running -> Stopping) need the lock,
//! matching the teacher's `ModelLifecycle::load`/`unload` discipline of
//! holding a write lock only across the transition itself, not the whole
//! record's lifetime. A record is created fresh on every load attempt and
//! removed from the registry once it reaches `Stopped` or `Error`; `load_epoch`
//! is bumped on each fresh creation so stale completions from a superseded
//! load attempt can be told apart from the current one.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

use super::declaration::ModelDeclaration;

#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    Stopped,
    Starting,
    Running { port: u16 },
    Stopping,
    Error(String),
}

pub struct ModelRecord {
    pub declaration: ModelDeclaration,
    pub state: RwLock<ModelState>,
    active_requests: AtomicUsize,
    last_used_ms: AtomicI64,
    load_epoch: AtomicU64,
    settled: Notify,
}

impl ModelRecord {
    pub fn new(declaration: ModelDeclaration) -> Arc<Self> {
        Arc::new(Self {
            declaration,
            state: RwLock::new(ModelState::Stopped),
            active_requests: AtomicUsize::new(0),
            last_used_ms: AtomicI64::new(0),
            load_epoch: AtomicU64::new(0),
            settled: Notify::new(),
        })
    }

    /// Create a fresh record already in `Starting`, for a new load attempt —
    /// the record `ModelManager::admit` publishes into the registry.
    pub(crate) fn new_loading(declaration: ModelDeclaration, load_epoch: u64) -> Arc<Self> {
        Arc::new(Self {
            declaration,
            state: RwLock::new(ModelState::Starting),
            active_requests: AtomicUsize::new(0),
            last_used_ms: AtomicI64::new(0),
            load_epoch: AtomicU64::new(load_epoch),
            settled: Notify::new(),
        })
    }

    pub fn load_epoch(&self) -> u64 {
        self.load_epoch.load(Ordering::SeqCst)
    }

    pub fn active_requests(&self) -> usize {
        self.active_requests.load(Ordering::SeqCst)
    }

    pub fn touch(&self) {
        self.last_used_ms.store(now_ms(), Ordering::SeqCst);
    }

    pub fn idle_for_ms(&self) -> i64 {
        now_ms() - self.last_used_ms.load(Ordering::SeqCst)
    }

    pub fn last_used_ms(&self) -> i64 {
        self.last_used_ms.load(Ordering::SeqCst)
    }

    pub(crate) fn incr_active(&self) {
        self.active_requests.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn decr_active(&self) {
        self.active_requests.fetch_sub(1, Ordering::SeqCst);
        self.touch();
    }

    /// Transition to `next`, then wake anyone waiting on `wait_until_settled`.
    pub(crate) async fn set_state(&self, next: ModelState) {
        *self.state.write().await = next;
        self.settled.notify_waiters();
    }

    /// Sleep until this record leaves `Starting`/`Stopping`. Registers for the
    /// wakeup before checking the state, so a transition that happens between
    /// the check and the wait can't be missed.
    pub(crate) async fn wait_until_settled(&self) {
        loop {
            let notified = self.settled.notified();
            if !matches!(
                *self.state.read().await,
                ModelState::Starting | ModelState::Stopping
            ) {
                return;
            }
            notified.await;
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// RAII reference obtained from `ModelManager::acquire`. Releases the
/// record's reference count unconditionally on drop, whichever path the
/// holding request took to get there — grounded on
/// `memory::limits::ResourceGuard`.
pub struct LiveRef {
    pub port: u16,
    record: Arc<ModelRecord>,
}

impl LiveRef {
    pub(crate) fn new(record: Arc<ModelRecord>, port: u16) -> Self {
        record.incr_active();
        record.touch();
        Self { port, record }
    }

    pub fn model_id(&self) -> &str {
        &self.record.declaration.id
    }
}

impl Drop for LiveRef {
    fn drop(&mut self) {
        self.record.decr_active();
    }
}
