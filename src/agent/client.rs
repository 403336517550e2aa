// File: src/agent/client.rs
//
// Issues add/delete/sync calls against the forwarding agent with a bounded
// timeout, and commits into the installed table only what the agent
// acknowledged.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::{AgentOp, FibAgent};
use crate::error::AgentError;
use crate::perf::unix_ts_ms;
use crate::route::{Prefix, RouteDelta, RouteTable, UnicastRoute};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentHealth {
    pub consecutive_failures: u32,
    pub last_error: Option<AgentError>,
    /// Unix ms of the last acknowledged call.
    pub last_success_ts: Option<u64>,
}

impl AgentHealth {
    pub fn is_healthy(&self) -> bool {
        self.consecutive_failures == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentStats {
    pub add_calls: u64,
    pub delete_calls: u64,
    pub sync_calls: u64,
    pub add_failures: u64,
    pub delete_failures: u64,
    pub sync_failures: u64,
    pub routes_added: u64,
    pub routes_deleted: u64,
    pub dry_run_skipped: u64,
}

#[derive(Debug)]
pub struct AgentClient {
    agent: Arc<dyn FibAgent>,
    timeout: Duration,
    dry_run: bool,
    ordered_install: bool,
    health: AgentHealth,
    stats: AgentStats,
}

impl AgentClient {
    pub fn new(
        agent: Arc<dyn FibAgent>,
        timeout: Duration,
        dry_run: bool,
        ordered_install: bool,
    ) -> Self {
        AgentClient {
            agent,
            timeout,
            dry_run,
            ordered_install,
            health: AgentHealth::default(),
            stats: AgentStats::default(),
        }
    }

    pub fn health(&self) -> &AgentHealth {
        &self.health
    }

    pub fn stats(&self) -> &AgentStats {
        &self.stats
    }

    /// Programs `delta` and commits each acknowledged part into `installed`.
    ///
    /// With ordered install adds go out before deletes, otherwise deletes go
    /// first. A prefix that is both added and deleted is a replacement: the
    /// add supersedes the old entry and no delete is issued for it. The first
    /// failing call stops the sequence; parts that were not acknowledged stay
    /// out of `installed` and are re-attempted by the next cycle.
    pub async fn apply_delta(
        &mut self,
        delta: &RouteDelta,
        installed: &mut RouteTable,
    ) -> Result<(), AgentError> {
        let replaced: HashSet<Prefix> = delta.to_add.iter().map(|r| r.dest.trunc()).collect();
        let to_delete: Vec<Prefix> = delta
            .to_delete
            .iter()
            .filter(|p| !replaced.contains(&p.trunc()))
            .copied()
            .collect();
        if to_delete.len() < delta.to_delete.len() {
            log::debug!(
                "{} deletes superseded by replacing adds",
                delta.to_delete.len() - to_delete.len()
            );
        }

        if self.ordered_install {
            self.add(&delta.to_add, installed).await?;
            self.delete(&to_delete, installed).await
        } else {
            self.delete(&to_delete, installed).await?;
            self.add(&delta.to_add, installed).await
        }
    }

    /// Pushes the whole `intended` table. On success `installed` becomes an
    /// exact copy of it.
    pub async fn full_sync(
        &mut self,
        intended: &RouteTable,
        installed: &mut RouteTable,
    ) -> Result<(), AgentError> {
        let routes = intended.routes();
        if self.dry_run {
            log::info!("dry-run: would sync {} routes", routes.len());
            self.stats.dry_run_skipped += 1;
        } else {
            self.stats.sync_calls += 1;
            log::debug!("syncing {} routes", routes.len());
            let agent = self.agent.clone();
            if let Err(e) = self
                .call(AgentOp::SyncRoutes, agent.sync_routes(routes))
                .await
            {
                self.stats.sync_failures += 1;
                return Err(e);
            }
        }
        *installed = intended.clone();
        Ok(())
    }

    async fn add(
        &mut self,
        to_add: &[UnicastRoute],
        installed: &mut RouteTable,
    ) -> Result<(), AgentError> {
        if to_add.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            log::info!("dry-run: would add {} routes", to_add.len());
            for route in to_add {
                log::debug!("dry-run: add {}", route);
            }
            self.stats.dry_run_skipped += 1;
        } else {
            self.stats.add_calls += 1;
            let agent = self.agent.clone();
            if let Err(e) = self
                .call(AgentOp::AddRoutes, agent.add_routes(to_add.to_vec()))
                .await
            {
                self.stats.add_failures += 1;
                return Err(e);
            }
            self.stats.routes_added += to_add.len() as u64;
        }
        installed.add_routes(to_add);
        Ok(())
    }

    async fn delete(
        &mut self,
        to_delete: &[Prefix],
        installed: &mut RouteTable,
    ) -> Result<(), AgentError> {
        if to_delete.is_empty() {
            return Ok(());
        }
        if self.dry_run {
            log::info!("dry-run: would delete {} routes", to_delete.len());
            for prefix in to_delete {
                log::debug!("dry-run: delete {}", prefix);
            }
            self.stats.dry_run_skipped += 1;
        } else {
            self.stats.delete_calls += 1;
            let agent = self.agent.clone();
            if let Err(e) = self
                .call(
                    AgentOp::DeleteRoutes,
                    agent.delete_routes(to_delete.to_vec()),
                )
                .await
            {
                self.stats.delete_failures += 1;
                return Err(e);
            }
            self.stats.routes_deleted += to_delete.len() as u64;
        }
        installed.delete_routes(to_delete);
        Ok(())
    }

    async fn call<F>(&mut self, op: AgentOp, fut: F) -> Result<(), AgentError>
    where
        F: Future<Output = Result<(), AgentError>>,
    {
        let result = match tokio::time::timeout(self.timeout, fut).await {
            Ok(r) => r,
            Err(_) => Err(AgentError::Timeout(op.to_string())),
        };
        match &result {
            Ok(()) => {
                self.health.consecutive_failures = 0;
                self.health.last_success_ts = Some(unix_ts_ms());
            }
            Err(e) => {
                self.health.consecutive_failures += 1;
                self.health.last_error = Some(e.clone());
                log::warn!(
                    "{} failed ({} consecutive failures): {}",
                    op,
                    self.health.consecutive_failures,
                    e
                );
            }
        }
        result
    }
}
