// File: src/fib/publisher.rs
//
// Upstream side of the snapshot subscription. Delivery is fire-and-forget:
// a snapshot that does not fit in the channel is dropped.

use serde_derive::Deserialize;
use std::path::Path;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::ConfigError;
use crate::perf::SNAPSHOT_PUBLISHED;
use crate::route::{RouteSnapshot, UnicastRoute};

#[derive(Debug, Clone)]
pub struct SnapshotPublisher {
    tx: mpsc::Sender<RouteSnapshot>,
}

/// Creates a publisher and the stream a Fib subscribes with.
pub fn channel(capacity: usize) -> (SnapshotPublisher, ReceiverStream<RouteSnapshot>) {
    let (tx, rx) = mpsc::channel(capacity);
    (SnapshotPublisher { tx }, ReceiverStream::new(rx))
}

impl SnapshotPublisher {
    /// Stamps the snapshot as published and sends it. Returns false if it was
    /// dropped.
    pub fn publish(&self, mut snapshot: RouteSnapshot) -> bool {
        snapshot
            .perf_events
            .push(&snapshot.node_name, SNAPSHOT_PUBLISHED);
        match self.tx.try_send(snapshot) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                log::warn!("route snapshot channel full, dropping snapshot");
                false
            }
            Err(TrySendError::Closed(_)) => {
                log::debug!("route snapshot subscriber gone");
                false
            }
        }
    }
}

#[derive(Deserialize, Debug)]
struct RouteFile {
    #[serde(default)]
    routes: Vec<UnicastRoute>,
}

/// Reads a static route table from a TOML file of `[[routes]]` entries.
pub fn load_route_file(path: &Path) -> Result<Vec<UnicastRoute>, ConfigError> {
    let c = std::fs::read_to_string(path)?;
    let file: RouteFile = toml::from_str(&c).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(file.routes)
}
