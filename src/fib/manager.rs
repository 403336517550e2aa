// File: src/fib/manager.rs
//
// The Fib event loop. Owns the intended table, the installed table (the
// last state the agent acknowledged), the debounce slot, the sync scheduler
// and the perf history; nothing else mutates them.

use futures::stream::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use super::context::FibContext;
use super::debounce::Debouncer;
use super::events::{FibCounters, FibQuery};
use super::handle::FibHandle;
use super::receiver::SnapshotReceiver;
use super::scheduler::SyncScheduler;
use crate::agent::AgentClient;
use crate::config::SyncConfig;
use crate::error::FibError;
use crate::perf::{
    PerfEvents, PerfTracker, DEBOUNCE_RELEASED, DELTA_COMPUTED, INSTALL_FAILED, NO_OP_CYCLE,
    ROUTES_INSTALLED,
};
use crate::route::{compute_delta, RouteSnapshot, RouteTable};

const QUERY_CHANNEL_SIZE: usize = 100;

#[derive(Debug)]
pub struct Fib {
    config: SyncConfig,
    receiver: SnapshotReceiver,
    debouncer: Debouncer,
    scheduler: SyncScheduler,
    client: AgentClient,
    /// Latest released snapshot, `None` until the first one.
    intended: Option<RouteTable>,
    installed: RouteTable,
    /// Whether a full sync has been acknowledged since startup.
    synced: bool,
    perf: PerfTracker,
    counters: FibCounters,
}

impl Fib {
    pub fn new(ctx: FibContext) -> Self {
        let FibContext { config, agent } = ctx;
        Fib {
            receiver: SnapshotReceiver::new(&config.node_name, config.segment_routing),
            debouncer: Debouncer::new(config.debounce_min, config.debounce_max),
            scheduler: SyncScheduler::new(&config, Instant::now()),
            client: AgentClient::new(
                agent,
                config.agent_timeout,
                config.dry_run,
                config.ordered_install,
            ),
            intended: None,
            installed: RouteTable::default(),
            synced: false,
            perf: PerfTracker::new(config.perf_history_size),
            counters: FibCounters::default(),
            config,
        }
    }

    /// Starts the event loop on its own task, consuming snapshots from
    /// `snapshots` until stopped through the returned handle.
    pub fn spawn<S>(self, snapshots: S) -> FibHandle
    where
        S: Stream<Item = RouteSnapshot> + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(QUERY_CHANNEL_SIZE);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move { self.run(snapshots, rx, token).await });
        FibHandle::new(tx, cancel, task)
    }

    /// Sources are polled in a fixed order: shutdown, debounce expiry,
    /// periodic sync, inbound snapshots, queries. A handler always runs to
    /// completion, agent calls included, before the next poll.
    pub async fn run<S>(
        mut self,
        mut snapshots: S,
        mut queries: mpsc::Receiver<FibQuery>,
        cancel: CancellationToken,
    ) -> Result<(), FibError>
    where
        S: Stream<Item = RouteSnapshot> + Unpin,
    {
        log::info!(
            "fib for {} starting (dry_run: {}, periodic_sync: {}, ordered_install: {})",
            self.config.node_name,
            self.config.dry_run,
            self.config.periodic_sync,
            self.config.ordered_install
        );
        let mut subscribed = true;

        loop {
            let debounce_at = self.debouncer.deadline();
            let sync_at = self.scheduler.deadline();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = sleep_until(debounce_at.unwrap_or_else(Instant::now)), if debounce_at.is_some() => {
                    if let Some(snapshot) = self.debouncer.poll_release(Instant::now()) {
                        self.process_snapshot(snapshot).await?;
                    }
                }
                _ = sleep_until(sync_at.unwrap_or_else(Instant::now)), if sync_at.is_some() => {
                    if self.scheduler.fire(Instant::now()) {
                        log::debug!("periodic full sync");
                        self.full_sync().await?;
                    }
                }
                snapshot = snapshots.next(), if subscribed => match snapshot {
                    Some(snapshot) => self.on_snapshot(snapshot),
                    None => {
                        log::info!("route snapshot subscription closed");
                        subscribed = false;
                    }
                },
                query = queries.recv() => match query {
                    Some(query) => self.on_query(query),
                    None => {
                        log::info!("fib handle dropped, stopping");
                        break;
                    }
                },
            }
        }

        if self.debouncer.cancel().is_some() {
            log::debug!("discarding pending route snapshot on shutdown");
        }
        self.scheduler.cancel();
        log::info!(
            "fib for {} stopped with {} routes installed",
            self.config.node_name,
            self.installed.len()
        );
        Ok(())
    }

    fn on_snapshot(&mut self, snapshot: RouteSnapshot) {
        match self.receiver.accept(snapshot) {
            Some(snapshot) => {
                self.counters.snapshots_received += 1;
                if self.debouncer.push(snapshot, Instant::now()) {
                    self.counters.snapshots_coalesced += 1;
                }
            }
            None => self.counters.snapshots_dropped += 1,
        }
    }

    async fn process_snapshot(&mut self, snapshot: RouteSnapshot) -> Result<(), FibError> {
        let RouteSnapshot {
            node_name,
            unicast_routes,
            perf_events: mut chain,
        } = snapshot;
        chain.push(&node_name, DEBOUNCE_RELEASED);
        self.intended = Some(RouteTable::from_routes(unicast_routes));
        self.scheduler.snapshot_released();

        if self.config.wait_for_first_snapshot && !self.synced {
            log::info!("first route snapshot released, programming it with a full sync");
            let installed = self.full_sync().await?;
            Self::stamp_outcome(&mut chain, &node_name, installed);
            self.perf.record(chain);
            return Ok(());
        }

        let intended = match &self.intended {
            Some(t) => t,
            None => return Err(FibError::InvariantViolation("no intended table".to_string())),
        };
        let delta = compute_delta(&self.installed, intended);
        chain.push(&node_name, DELTA_COMPUTED);

        if delta.is_empty() {
            log::debug!("route snapshot matches installed table, nothing to program");
            self.counters.no_op_cycles += 1;
            chain.push(&node_name, NO_OP_CYCLE);
            self.perf.record(chain);
            return Ok(());
        }

        log::info!(
            "programming delta: {} routes to add, {} to delete",
            delta.to_add.len(),
            delta.to_delete.len()
        );
        self.counters.delta_cycles += 1;
        let installed = match self.client.apply_delta(&delta, &mut self.installed).await {
            Ok(()) => {
                self.check_converged()?;
                true
            }
            Err(e) => {
                self.counters.delta_failures += 1;
                log::warn!(
                    "route delta not fully programmed, leaving it to the next cycle: {}",
                    e
                );
                false
            }
        };
        Self::stamp_outcome(&mut chain, &node_name, installed);
        self.perf.record(chain);
        Ok(())
    }

    /// Pushes the whole intended table (empty before the first snapshot).
    /// Returns whether the agent acknowledged it.
    async fn full_sync(&mut self) -> Result<bool, FibError> {
        let empty = RouteTable::default();
        let intended = self.intended.as_ref().unwrap_or(&empty);
        self.counters.full_syncs += 1;
        match self.client.full_sync(intended, &mut self.installed).await {
            Ok(()) => {
                self.synced = true;
                log::info!("full sync programmed {} routes", self.installed.len());
                self.check_converged()?;
                Ok(true)
            }
            Err(e) => {
                self.counters.full_sync_failures += 1;
                log::warn!("full sync failed, leaving it to the next cycle: {}", e);
                Ok(false)
            }
        }
    }

    /// After an acknowledged change the installed table must match the
    /// intended one exactly.
    fn check_converged(&self) -> Result<(), FibError> {
        let empty = RouteTable::default();
        let intended = self.intended.as_ref().unwrap_or(&empty);
        let residual = compute_delta(&self.installed, intended);
        if residual.is_empty() {
            Ok(())
        } else {
            log::error!("installed table diverged from intended: {:?}", residual);
            Err(FibError::InvariantViolation(format!(
                "{} routes missing and {} stale after acknowledged update",
                residual.to_add.len(),
                residual.to_delete.len()
            )))
        }
    }

    fn stamp_outcome(chain: &mut PerfEvents, node_name: &str, installed: bool) {
        if installed {
            chain.push(node_name, ROUTES_INSTALLED);
        } else {
            chain.push(node_name, INSTALL_FAILED);
        }
    }

    fn on_query(&self, query: FibQuery) {
        log::trace!("fib query {:?}", query);
        match query {
            FibQuery::PerfHistory(tx) => {
                let _ = tx.send(self.perf.history());
            }
            FibQuery::RouteTable(tx) => {
                let _ = tx.send(self.installed.clone());
            }
            FibQuery::Counters(tx) => {
                let mut counters = self.counters.clone();
                counters.num_routes = self.installed.len();
                counters.agent = self.client.stats().clone();
                let _ = tx.send(counters);
            }
            FibQuery::AgentHealth(tx) => {
                let _ = tx.send(self.client.health().clone());
            }
        }
    }
}
