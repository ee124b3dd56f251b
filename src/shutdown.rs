//! Shutdown coordinator.
//!
//! Tracks in-flight request guards so a SIGINT/SIGTERM can drain before the
//! process exits instead of cutting connections mid-response. Grounded on
//! `ipc/handler.rs`'s `self.shutdown.track()` guard pattern and `main.rs`'s
//! `ShutdownResult::Complete`/`Timeout{remaining}` sequence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

pub struct ShutdownCoordinator {
    in_flight: AtomicUsize,
    draining: watch::Sender<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownResult {
    Complete,
    Timeout { remaining: usize },
}

impl ShutdownCoordinator {
    pub fn new() -> Arc<Self> {
        let (draining, _) = watch::channel(false);
        Arc::new(Self {
            in_flight: AtomicUsize::new(0),
            draining,
        })
    }

    pub fn is_draining(&self) -> bool {
        *self.draining.borrow()
    }

    /// Register one in-flight request. Returns `None` if shutdown has
    /// already started — callers should reject new work rather than begin
    /// it, matching the teacher's `handle_inference` short-circuit.
    pub fn track(self: &Arc<Self>) -> Option<InFlightGuard> {
        if self.is_draining() {
            return None;
        }
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        Some(InFlightGuard {
            coordinator: self.clone(),
        })
    }

    /// Stop accepting new work and wait (up to `timeout`) for in-flight
    /// requests to finish.
    pub async fn initiate(&self, timeout: Duration) -> ShutdownResult {
        let _ = self.draining.send(true);
        let deadline = Instant::now() + timeout;

        loop {
            let remaining = self.in_flight.load(Ordering::SeqCst);
            if remaining == 0 {
                return ShutdownResult::Complete;
            }
            if Instant::now() >= deadline {
                return ShutdownResult::Timeout { remaining };
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }
}

pub struct InFlightGuard {
    coordinator: Arc<ShutdownCoordinator>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.coordinator.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn initiate_completes_immediately_with_no_in_flight_requests() {
        let coordinator = ShutdownCoordinator::new();
        let result = coordinator.initiate(Duration::from_millis(50)).await;
        assert_eq!(result, ShutdownResult::Complete);
    }

    #[tokio::test]
    async fn track_refuses_new_work_once_draining() {
        let coordinator = ShutdownCoordinator::new();
        let _ = coordinator.draining.send(true);
        assert!(coordinator.track().is_none());
    }

    #[tokio::test]
    async fn initiate_times_out_while_a_guard_is_still_held() {
        let coordinator = ShutdownCoordinator::new();
        let guard = coordinator.track().unwrap();
        let result = coordinator.initiate(Duration::from_millis(100)).await;
        assert_eq!(result, ShutdownResult::Timeout { remaining: 1 });
        drop(guard);
    }
}
