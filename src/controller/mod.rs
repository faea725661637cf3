//! Traffic controller seam.
//!
//! The controller is the daemon's data path. The admin server only ever asks
//! it for a JSON snapshot of its state, and only on the controller's own
//! event loop.

pub mod event_loop;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde_json::{json, Value};

pub use event_loop::{EventLoop, LoopRunner, LoopStopped};

/// State introspection offered by the traffic controller.
pub trait Controller: Send + Sync {
    /// Snapshot of the controller's state. Called on the controller's loop.
    fn inspect_state(&self) -> Value;
}

/// A controller together with the loop it runs on.
#[derive(Clone)]
pub struct ControllerHandle {
    pub controller: Arc<dyn Controller>,
    pub event_loop: EventLoop,
}

impl ControllerHandle {
    pub fn new(controller: Arc<dyn Controller>, event_loop: EventLoop) -> Self {
        Self { controller, event_loop }
    }
}

/// Transaction counters for the routing data path.
#[derive(Debug)]
pub struct TrafficStats {
    started_at: Instant,
    transactions: AtomicU64,
    bytes_forwarded: AtomicU64,
}

impl TrafficStats {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            transactions: AtomicU64::new(0),
            bytes_forwarded: AtomicU64::new(0),
        }
    }

    pub fn record_transaction(&self, bytes: u64) {
        self.transactions.fetch_add(1, Ordering::Relaxed);
        self.bytes_forwarded.fetch_add(bytes, Ordering::Relaxed);
    }
}

impl Default for TrafficStats {
    fn default() -> Self {
        Self::new()
    }
}

impl Controller for TrafficStats {
    fn inspect_state(&self) -> Value {
        json!({
            "uptime_secs": self.started_at.elapsed().as_secs(),
            "transactions": self.transactions.load(Ordering::Relaxed),
            "bytes_forwarded": self.bytes_forwarded.load(Ordering::Relaxed),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_snapshot() {
        let stats = TrafficStats::new();
        stats.record_transaction(100);
        stats.record_transaction(50);

        let state = stats.inspect_state();
        assert_eq!(state["transactions"], 2);
        assert_eq!(state["bytes_forwarded"], 150);
    }
}
