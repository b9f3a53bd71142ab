//! Single-shot, generation-tagged timers
//!
//! Each scheduled timer carries the generation that was current when it was
//! armed. Bumping the generation invalidates every earlier timer: when one
//! of them later fires, its token no longer matches and it is a no-op. The
//! spawned sleep can also be aborted outright through [`TimerHandle`].

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Monotonic generation counter for timers owned by one state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimerGeneration {
    current: u64,
}

impl TimerGeneration {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every outstanding timer and return the new generation.
    pub fn bump(&mut self) -> u64 {
        self.current = self.current.wrapping_add(1);
        self.current
    }

    pub fn current(&self) -> u64 {
        self.current
    }

    pub fn is_current(&self, token: u64) -> bool {
        self.current == token
    }
}

/// Handle to an armed timer; dropping it does not cancel, `cancel` does.
#[derive(Debug)]
pub struct TimerHandle {
    token: u64,
    task: JoinHandle<()>,
}

impl TimerHandle {
    pub fn token(&self) -> u64 {
        self.token
    }

    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Send `make(token)` on `tx` after `delay`.
pub fn schedule<T, F>(delay: Duration, token: u64, tx: mpsc::UnboundedSender<T>, make: F) -> TimerHandle
where
    T: Send + 'static,
    F: FnOnce(u64) -> T + Send + 'static,
{
    let task = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        if tx.send(make(token)).is_err() {
            log::trace!("Timer {} fired after its receiver closed", token);
        }
    });
    TimerHandle { token, task }
}
