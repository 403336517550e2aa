// File: src/fib/debounce.rs
//
// Single-slot, latest-wins coalescing of route snapshots.

use std::time::Duration;
use tokio::time::Instant;

use crate::route::RouteSnapshot;

/// Holds at most one pending snapshot. Every arrival replaces the pending one
/// and pushes the release deadline `min` into the future, but never past
/// `max` after the first arrival of the burst.
#[derive(Debug)]
pub struct Debouncer {
    min: Duration,
    max: Duration,
    pending: Option<RouteSnapshot>,
    burst_start: Option<Instant>,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(min: Duration, max: Duration) -> Self {
        Debouncer {
            min,
            max: max.max(min),
            pending: None,
            burst_start: None,
            deadline: None,
        }
    }

    /// Returns true when a pending snapshot was discarded.
    pub fn push(&mut self, snapshot: RouteSnapshot, now: Instant) -> bool {
        let replaced = self.pending.replace(snapshot).is_some();
        if replaced {
            log::trace!("coalescing route snapshot, pending one discarded");
        }
        let start = *self.burst_start.get_or_insert(now);
        self.deadline = Some(std::cmp::min(now + self.min, start + self.max));
        replaced
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Hands out the pending snapshot once its deadline has passed.
    pub fn poll_release(&mut self, now: Instant) -> Option<RouteSnapshot> {
        match self.deadline {
            Some(deadline) if deadline <= now => self.cancel(),
            _ => None,
        }
    }

    /// Drops the timer and returns whatever was pending.
    pub fn cancel(&mut self) -> Option<RouteSnapshot> {
        self.deadline = None;
        self.burst_start = None;
        self.pending.take()
    }
}
