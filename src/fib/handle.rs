use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::events::{FibCounters, FibQuery};
use crate::agent::AgentHealth;
use crate::error::FibError;
use crate::perf::PerfEvents;
use crate::route::RouteTable;

/// Read-only view of a running Fib, and the way to stop it.
#[derive(Debug)]
pub struct FibHandle {
    queries: mpsc::Sender<FibQuery>,
    cancel: CancellationToken,
    task: JoinHandle<Result<(), FibError>>,
}

impl FibHandle {
    pub(super) fn new(
        queries: mpsc::Sender<FibQuery>,
        cancel: CancellationToken,
        task: JoinHandle<Result<(), FibError>>,
    ) -> Self {
        FibHandle {
            queries,
            cancel,
            task,
        }
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> FibQuery) -> Result<T, FibError> {
        let (tx, rx) = oneshot::channel();
        self.queries
            .send(make(tx))
            .await
            .map_err(|_| FibError::ChannelClosed)?;
        rx.await.map_err(|_| FibError::ChannelClosed)
    }

    /// Most recent perf chains, oldest first.
    pub async fn get_perf_history(&self) -> Result<Vec<PerfEvents>, FibError> {
        self.query(FibQuery::PerfHistory).await
    }

    /// The table the forwarding agent last acknowledged.
    pub async fn get_current_route_table(&self) -> Result<RouteTable, FibError> {
        self.query(FibQuery::RouteTable).await
    }

    pub async fn get_counters(&self) -> Result<FibCounters, FibError> {
        self.query(FibQuery::Counters).await
    }

    pub async fn get_agent_health(&self) -> Result<AgentHealth, FibError> {
        self.query(FibQuery::AgentHealth).await
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stops the event loop. Any in-flight agent call completes or times out
    /// first; pending debounce and sync timers are dropped.
    pub async fn stop(self) -> Result<(), FibError> {
        self.cancel.cancel();
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(FibError::Stopped(e.to_string())),
        }
    }
}
