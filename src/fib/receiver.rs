use crate::perf::SNAPSHOT_RECEIVED;
use crate::route::RouteSnapshot;

/// Admits snapshots computed for this node and drops everything else.
#[derive(Debug, Clone)]
pub struct SnapshotReceiver {
    node_name: String,
    segment_routing: bool,
}

impl SnapshotReceiver {
    pub fn new(node_name: &str, segment_routing: bool) -> Self {
        SnapshotReceiver {
            node_name: node_name.to_string(),
            segment_routing,
        }
    }

    /// Returns the snapshot stamped as received, or `None` if it belongs to
    /// another node. Without segment routing, nexthop labels are stripped.
    pub fn accept(&self, mut snapshot: RouteSnapshot) -> Option<RouteSnapshot> {
        if snapshot.node_name != self.node_name {
            log::warn!(
                "dropping route snapshot for node {:?}, this is {:?}",
                snapshot.node_name,
                self.node_name
            );
            return None;
        }
        if !self.segment_routing {
            for route in snapshot.unicast_routes.iter_mut() {
                route.strip_labels();
            }
        }
        snapshot.perf_events.push(&self.node_name, SNAPSHOT_RECEIVED);
        log::debug!(
            "received route snapshot with {} routes",
            snapshot.unicast_routes.len()
        );
        Some(snapshot)
    }
}
