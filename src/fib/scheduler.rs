use std::time::Duration;
use tokio::time::Instant;

use crate::config::SyncConfig;

/// Decides when the full-sync path runs. The first firing is immediate; with
/// periodic sync enabled it then fires every interval, otherwise never again.
#[derive(Debug)]
pub struct SyncScheduler {
    interval: Duration,
    periodic: bool,
    wait_for_first_snapshot: bool,
    snapshot_seen: bool,
    next: Option<Instant>,
}

impl SyncScheduler {
    pub fn new(config: &SyncConfig, now: Instant) -> Self {
        SyncScheduler {
            interval: config.sync_interval,
            periodic: config.periodic_sync,
            wait_for_first_snapshot: config.wait_for_first_snapshot,
            snapshot_seen: false,
            next: Some(now),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.next
    }

    /// Marks that a snapshot has left the debouncer, so an intended table
    /// exists and full syncs may run.
    pub fn snapshot_released(&mut self) {
        self.snapshot_seen = true;
    }

    /// Consumes the current firing and schedules the next one. Returns false
    /// when the sync must be skipped because no snapshot has been released yet.
    pub fn fire(&mut self, now: Instant) -> bool {
        let fired_at = self.next.unwrap_or(now);
        self.next = if self.periodic {
            let next = fired_at + self.interval;
            if next <= now {
                Some(now + self.interval)
            } else {
                Some(next)
            }
        } else {
            None
        };

        if self.wait_for_first_snapshot && !self.snapshot_seen {
            log::debug!("skipping full sync, no route snapshot released yet");
            return false;
        }
        true
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }
}
