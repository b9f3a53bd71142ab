//! Drop-not-queue single-flight gate
//!
//! A gate admits one operation at a time. Later requests are refused rather
//! than queued, and the flag is cleared by the guard's `Drop`, so every exit
//! path (success, error, panic in a blocking task, cancelled future) frees it.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SingleFlight {
    name: &'static str,
    busy: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl SingleFlight {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: Arc::new(AtomicBool::new(false)),
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Claim the gate, or `None` if an operation is already outstanding.
    pub fn try_begin(&self) -> Option<FlightGuard> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            Some(FlightGuard {
                name: self.name,
                busy: Arc::clone(&self.busy),
            })
        } else {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            log::trace!("{} busy, request dropped", self.name);
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Requests refused since the gate was created.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Holds a [`SingleFlight`] gate closed until dropped.
#[derive(Debug)]
pub struct FlightGuard {
    name: &'static str,
    busy: Arc<AtomicBool>,
}

impl FlightGuard {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}
