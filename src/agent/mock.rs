// File: src/agent/mock.rs
//
// In-memory forwarding plane. Keeps the programmed table and a log of every
// call, and can be told to fail or stall calls.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{watch, Mutex};

use super::{AgentOp, FibAgent};
use crate::error::AgentError;
use crate::route::{Prefix, RouteTable, UnicastRoute};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentCall {
    Add(Vec<UnicastRoute>),
    Delete(Vec<Prefix>),
    Sync(Vec<UnicastRoute>),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct CallCounts {
    updates: usize,
    syncs: usize,
}

#[derive(Debug, Default)]
struct MockState {
    table: RouteTable,
    calls: Vec<AgentCall>,
    fail_next: HashMap<AgentOp, usize>,
    unreachable: bool,
    delay: Duration,
}

#[derive(Debug)]
pub struct MockAgent {
    state: Mutex<MockState>,
    counts: watch::Sender<CallCounts>,
}

impl Default for MockAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAgent {
    pub fn new() -> Self {
        let (counts, _) = watch::channel(CallCounts::default());
        MockAgent {
            state: Mutex::new(MockState::default()),
            counts,
        }
    }

    /// The table as currently programmed.
    pub async fn table(&self) -> RouteTable {
        self.state.lock().await.table.clone()
    }

    pub async fn calls(&self) -> Vec<AgentCall> {
        self.state.lock().await.calls.clone()
    }

    /// Add and delete calls completed so far, successful or not.
    pub fn update_count(&self) -> usize {
        self.counts.borrow().updates
    }

    pub fn sync_count(&self) -> usize {
        self.counts.borrow().syncs
    }

    /// Makes the next `n` calls of `op` fail with a transport error.
    pub async fn fail_next(&self, op: AgentOp, n: usize) {
        self.state.lock().await.fail_next.insert(op, n);
    }

    /// Makes every call fail until cleared.
    pub async fn set_unreachable(&self, unreachable: bool) {
        self.state.lock().await.unreachable = unreachable;
    }

    /// Delays every call before it takes effect.
    pub async fn set_delay(&self, delay: Duration) {
        self.state.lock().await.delay = delay;
    }

    /// Mutates the programmed table behind the Fib's back.
    pub async fn tamper(&self, f: impl FnOnce(&mut RouteTable)) {
        f(&mut self.state.lock().await.table);
    }

    /// Waits until at least `n` add or delete calls have completed.
    pub async fn wait_for_updates(&self, n: usize) {
        let mut rx = self.counts.subscribe();
        let _ = rx.wait_for(|c| c.updates >= n).await;
    }

    /// Waits until at least `n` sync calls have completed.
    pub async fn wait_for_syncs(&self, n: usize) {
        let mut rx = self.counts.subscribe();
        let _ = rx.wait_for(|c| c.syncs >= n).await;
    }

    async fn handle(&self, op: AgentOp, call: AgentCall) -> Result<(), AgentError> {
        let result = self.apply(op, call).await;
        self.counts.send_modify(|c| match op {
            AgentOp::SyncRoutes => c.syncs += 1,
            _ => c.updates += 1,
        });
        result
    }

    async fn apply(&self, op: AgentOp, call: AgentCall) -> Result<(), AgentError> {
        let delay = {
            let mut s = self.state.lock().await;
            s.calls.push(call.clone());
            s.delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut s = self.state.lock().await;
        if s.unreachable {
            return Err(AgentError::Transport("agent unreachable".to_string()));
        }
        if let Some(n) = s.fail_next.get_mut(&op) {
            if *n > 0 {
                *n -= 1;
                return Err(AgentError::Transport(format!("injected {} failure", op)));
            }
        }
        match call {
            AgentCall::Add(routes) => s.table.add_routes(&routes),
            AgentCall::Delete(prefixes) => s.table.delete_routes(&prefixes),
            AgentCall::Sync(routes) => s.table = RouteTable::from_routes(routes),
        }
        Ok(())
    }
}

#[async_trait]
impl FibAgent for MockAgent {
    async fn add_routes(&self, routes: Vec<UnicastRoute>) -> Result<(), AgentError> {
        self.handle(AgentOp::AddRoutes, AgentCall::Add(routes)).await
    }

    async fn delete_routes(&self, prefixes: Vec<Prefix>) -> Result<(), AgentError> {
        self.handle(AgentOp::DeleteRoutes, AgentCall::Delete(prefixes))
            .await
    }

    async fn sync_routes(&self, routes: Vec<UnicastRoute>) -> Result<(), AgentError> {
        self.handle(AgentOp::SyncRoutes, AgentCall::Sync(routes)).await
    }
}
