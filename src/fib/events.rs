// File: src/fib/events.rs
//
// Read-only queries answered by the Fib event loop.

use tokio::sync::oneshot;

use crate::agent::{AgentHealth, AgentStats};
use crate::perf::PerfEvents;
use crate::route::RouteTable;

#[derive(Debug)]
pub enum FibQuery {
    PerfHistory(oneshot::Sender<Vec<PerfEvents>>),
    RouteTable(oneshot::Sender<RouteTable>),
    Counters(oneshot::Sender<FibCounters>),
    AgentHealth(oneshot::Sender<AgentHealth>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FibCounters {
    pub num_routes: usize,
    pub snapshots_received: u64,
    pub snapshots_dropped: u64,
    pub snapshots_coalesced: u64,
    pub delta_cycles: u64,
    pub delta_failures: u64,
    pub no_op_cycles: u64,
    pub full_syncs: u64,
    pub full_sync_failures: u64,
    pub agent: AgentStats,
}
