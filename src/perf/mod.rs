// File: src/perf/mod.rs
//
// Perf event chains stamped onto snapshots as they move through the Fib
// pipeline, and the bounded history kept for introspection.

use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

pub const SNAPSHOT_PUBLISHED: &str = "SNAPSHOT_PUBLISHED";
pub const SNAPSHOT_RECEIVED: &str = "SNAPSHOT_RECEIVED";
pub const DEBOUNCE_RELEASED: &str = "DEBOUNCE_RELEASED";
pub const DELTA_COMPUTED: &str = "DELTA_COMPUTED";
pub const ROUTES_INSTALLED: &str = "ROUTES_INSTALLED";
pub const INSTALL_FAILED: &str = "INSTALL_FAILED";
pub const NO_OP_CYCLE: &str = "NO_OP_CYCLE";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerfEvent {
    pub node_name: String,
    pub event_descr: String,
    /// Milliseconds since the unix epoch.
    pub unix_ts: u64,
}

/// Append-only chain of events for one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PerfEvents {
    pub events: Vec<PerfEvent>,
}

pub fn unix_ts_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl PerfEvents {
    pub fn push(&mut self, node_name: &str, event_descr: &str) {
        self.push_at(node_name, event_descr, unix_ts_ms());
    }

    pub fn push_at(&mut self, node_name: &str, event_descr: &str, unix_ts: u64) {
        self.events.push(PerfEvent {
            node_name: node_name.to_string(),
            event_descr: event_descr.to_string(),
            unix_ts,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Timestamp of the first event with the given description.
    pub fn find(&self, event_descr: &str) -> Option<u64> {
        self.events
            .iter()
            .find(|e| e.event_descr == event_descr)
            .map(|e| e.unix_ts)
    }

    pub fn last_descr(&self) -> Option<&str> {
        self.events.last().map(|e| e.event_descr.as_str())
    }

    /// Total duration covered by the chain, in milliseconds.
    pub fn total_ms(&self) -> u64 {
        match (self.events.first(), self.events.last()) {
            (Some(first), Some(last)) => last.unix_ts.saturating_sub(first.unix_ts),
            _ => 0,
        }
    }
}

/// The latency buckets an operator looks at, in milliseconds. A bucket is
/// `None` when the chain lacks one of its endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LatencyBreakdown {
    pub route_receive: Option<u64>,
    pub debounce: Option<u64>,
    pub route_install: Option<u64>,
}

impl LatencyBreakdown {
    pub fn from_chain(chain: &PerfEvents) -> Self {
        let span = |from: &str, to: &str| match (chain.find(from), chain.find(to)) {
            (Some(a), Some(b)) => Some(b.saturating_sub(a)),
            _ => None,
        };
        LatencyBreakdown {
            route_receive: span(SNAPSHOT_PUBLISHED, SNAPSHOT_RECEIVED),
            debounce: span(SNAPSHOT_RECEIVED, DEBOUNCE_RELEASED),
            route_install: span(DEBOUNCE_RELEASED, ROUTES_INSTALLED),
        }
    }
}

/// Ring of the most recent completed chains.
#[derive(Debug, Clone)]
pub struct PerfTracker {
    capacity: usize,
    history: VecDeque<PerfEvents>,
}

impl PerfTracker {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        PerfTracker {
            capacity,
            history: VecDeque::with_capacity(capacity),
        }
    }

    pub fn record(&mut self, chain: PerfEvents) {
        if chain.is_empty() {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        log::trace!(
            "recording perf chain ending in {:?}, {} ms total",
            chain.last_descr(),
            chain.total_ms()
        );
        self.history.push_back(chain);
    }

    /// Oldest first.
    pub fn history(&self) -> Vec<PerfEvents> {
        self.history.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
