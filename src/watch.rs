//! Cooperative cancellation.
//!
//! Two mechanisms exist in this crate, both cooperative (spec.md §5):
//! the accept loop's internal `stop_requested` flag (see `tcp.rs`), and the
//! externally supplied [`Watch`] trait consulted by `read_loop` and
//! `wait_message`. Neither interrupts a thread parked in a blocking
//! syscall; cancellation is observed only at the next poll iteration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cancellation token queried by long-running blocking operations.
pub trait Watch: Send + Sync {
    fn should_stop(&self) -> bool;
}

/// A `Watch` that never requests a stop. The default when no cancellation
/// is wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStop;

impl Watch for NeverStop {
    fn should_stop(&self) -> bool {
        false
    }
}

/// A simple `Arc<AtomicBool>`-backed watch, cheap to clone and share
/// between the thread driving a blocking call and the thread that decides
/// to cancel it.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl Watch for StopFlag {
    fn should_stop(&self) -> bool {
        self.is_set()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_flag_signals() {
        let flag = StopFlag::new();
        assert!(!flag.should_stop());
        flag.signal();
        assert!(flag.should_stop());
    }

    #[test]
    fn never_stop_never_stops() {
        assert!(!NeverStop.should_stop());
    }
}
