//! Port Allocator.
//!
//! Hands out free TCP ports to backend processes from a configured range,
//! verifying each candidate is actually bindable before returning it — a
//! port the OS considers free can still be held by some unrelated process
//! that bound to `127.0.0.1` a moment ago.

use std::net::TcpListener;
use std::sync::atomic::{AtomicU32, Ordering};

#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("no free port found in range {base}..{}", base + range)]
    Exhausted { base: u16, range: u16 },
}

pub struct PortAllocator {
    base: u16,
    range: u16,
    next: AtomicU32,
}

impl PortAllocator {
    pub fn new(base: u16, range: u16) -> Self {
        Self {
            base,
            range,
            next: AtomicU32::new(0),
        }
    }

    /// Reserve a free port, scanning forward from the last-returned offset so
    /// repeated calls don't all race for the same low end of the range.
    pub fn allocate(&self) -> Result<u16, PortError> {
        for _ in 0..self.range {
            let offset = self.next.fetch_add(1, Ordering::Relaxed) % self.range as u32;
            let candidate = self.base + offset as u16;
            if Self::is_bindable(candidate) {
                return Ok(candidate);
            }
        }
        Err(PortError::Exhausted {
            base: self.base,
            range: self.range,
        })
    }

    fn is_bindable(port: u16) -> bool {
        TcpListener::bind(("127.0.0.1", port)).is_ok()
    }
}
