//! Counters reported in snapshots

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct NodeStats {
    calls_served: Arc<AtomicU64>,
    invokes_sent: Arc<AtomicU64>,
    started: Instant,
}

impl NodeStats {
    pub fn new() -> Self {
        Self {
            calls_served: Arc::new(AtomicU64::new(0)),
            invokes_sent: Arc::new(AtomicU64::new(0)),
            started: Instant::now(),
        }
    }

    pub fn record_call(&self) {
        self.calls_served.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_invoke(&self) {
        self.invokes_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn calls_served(&self) -> u64 {
        self.calls_served.load(Ordering::Relaxed)
    }

    pub fn invokes_sent(&self) -> u64 {
        self.invokes_sent.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

impl Default for NodeStats {
    fn default() -> Self {
        Self::new()
    }
}
