use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

use ufib::agent::{AgentCall, AgentOp, MockAgent};
use ufib::config::{SyncConfig, SyncConfigBuilder};
use ufib::error::AgentError;
use ufib::fib::{self, Fib, FibContext, FibHandle, SnapshotPublisher};
use ufib::perf::{
    DEBOUNCE_RELEASED, DELTA_COMPUTED, INSTALL_FAILED, NO_OP_CYCLE, ROUTES_INSTALLED,
    SNAPSHOT_PUBLISHED, SNAPSHOT_RECEIVED,
};
use ufib::route::{NextHop, RouteSnapshot, RouteTable, UnicastRoute};

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

fn config() -> SyncConfigBuilder {
    let mut b = SyncConfigBuilder::default();
    b.node_name("node-1")
        .periodic_sync(false)
        .wait_for_first_snapshot(false)
        .sync_interval(Duration::from_secs(2))
        .debounce_min(ms(10))
        .debounce_max(ms(250))
        .agent_timeout(Duration::from_secs(1));
    b
}

fn start(sync: SyncConfig) -> (Arc<MockAgent>, SnapshotPublisher, FibHandle) {
    let agent = Arc::new(MockAgent::new());
    let (publisher, snapshots) = fib::channel(16);
    let handle = Fib::new(FibContext::new(sync, agent.clone())).spawn(snapshots);
    (agent, publisher, handle)
}

fn route(prefix: &str, hops: &[&str]) -> UnicastRoute {
    UnicastRoute::new(
        prefix.parse().unwrap(),
        hops.iter()
            .map(|h| NextHop::new(h.parse().unwrap(), Some("eth0"))),
    )
}

fn snapshot(routes: Vec<UnicastRoute>) -> RouteSnapshot {
    RouteSnapshot::new("node-1", routes)
}

async fn settle() {
    sleep(ms(100)).await;
}

fn adds(calls: &[AgentCall]) -> Vec<Vec<UnicastRoute>> {
    calls
        .iter()
        .filter_map(|c| match c {
            AgentCall::Add(routes) => Some(routes.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn initial_sync_pushes_empty_table() {
    let (agent, _publisher, handle) = start(config().build().unwrap());
    settle().await;

    assert_eq!(agent.calls().await, vec![AgentCall::Sync(vec![])]);
    assert!(handle.get_current_route_table().await.unwrap().is_empty());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn same_snapshot_twice_is_a_no_op() {
    let (agent, publisher, handle) = start(config().build().unwrap());
    let routes = vec![
        route("10.0.1.0/24", &["192.0.2.1"]),
        route("10.0.2.0/24", &["192.0.2.2", "192.0.2.3"]),
    ];

    publisher.publish(snapshot(routes.clone()));
    settle().await;
    assert_eq!(agent.update_count(), 1);

    publisher.publish(snapshot(routes.clone()));
    settle().await;
    assert_eq!(agent.update_count(), 1);

    let counters = handle.get_counters().await.unwrap();
    assert_eq!(counters.delta_cycles, 1);
    assert_eq!(counters.no_op_cycles, 1);
    assert_eq!(counters.num_routes, 2);

    let history = handle.get_perf_history().await.unwrap();
    assert_eq!(history.last().unwrap().last_descr(), Some(NO_OP_CYCLE));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn burst_is_coalesced_into_last_snapshot() {
    let (agent, publisher, handle) = start(config().build().unwrap());
    settle().await;

    for i in 1..=5 {
        let hop = format!("192.0.2.{}", i);
        publisher.publish(snapshot(vec![route("10.0.1.0/24", &[hop.as_str()])]));
        sleep(ms(5)).await;
    }
    settle().await;

    let calls = agent.calls().await;
    assert_eq!(adds(&calls), vec![vec![route("10.0.1.0/24", &["192.0.2.5"])]]);
    let counters = handle.get_counters().await.unwrap();
    assert_eq!(counters.snapshots_received, 5);
    assert_eq!(counters.snapshots_coalesced, 4);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn delta_touches_only_changed_routes() {
    let (agent, publisher, handle) = start(config().build().unwrap());

    publisher.publish(snapshot(vec![
        route("10.0.1.0/24", &["192.0.2.1"]),
        route("10.0.2.0/24", &["192.0.2.2"]),
    ]));
    settle().await;

    publisher.publish(snapshot(vec![
        route("10.0.1.0/24", &["192.0.2.1"]),
        route("10.0.2.0/24", &["192.0.2.3"]),
        route("10.0.3.0/24", &["192.0.2.4"]),
    ]));
    settle().await;

    let calls = agent.calls().await;
    assert_eq!(
        calls.last().unwrap(),
        &AgentCall::Add(vec![
            route("10.0.2.0/24", &["192.0.2.3"]),
            route("10.0.3.0/24", &["192.0.2.4"]),
        ])
    );
    assert!(!calls.iter().any(|c| matches!(c, AgentCall::Delete(_))));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn withdrawn_routes_are_deleted() {
    let (agent, publisher, handle) = start(config().build().unwrap());

    publisher.publish(snapshot(vec![
        route("10.0.1.0/24", &["192.0.2.1"]),
        route("10.0.2.0/24", &["192.0.2.2"]),
    ]));
    settle().await;
    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.1"])]));
    settle().await;

    assert_eq!(
        agent.calls().await.last().unwrap(),
        &AgentCall::Delete(vec!["10.0.2.0/24".parse().unwrap()])
    );
    assert_eq!(agent.table().await.len(), 1);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn periodic_sync_heals_drift() {
    let (agent, publisher, handle) = start(config().periodic_sync(true).build().unwrap());
    let routes = vec![
        route("10.0.1.0/24", &["192.0.2.1"]),
        route("10.0.2.0/24", &["192.0.2.2"]),
    ];
    publisher.publish(snapshot(routes.clone()));
    settle().await;

    agent
        .tamper(|table| {
            table.delete_routes(&["10.0.1.0/24".parse().unwrap()]);
            table.add_routes(&[route("10.9.0.0/16", &["192.0.2.9"])]);
        })
        .await;
    assert_ne!(agent.table().await, RouteTable::from_routes(routes.clone()));

    sleep(Duration::from_secs(2)).await;

    let expected = RouteTable::from_routes(routes);
    assert_eq!(agent.sync_count(), 2);
    assert_eq!(agent.table().await, expected);
    assert_eq!(handle.get_current_route_table().await.unwrap(), expected);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn dry_run_never_calls_agent() {
    let (agent, publisher, handle) = start(
        config()
            .dry_run(true)
            .periodic_sync(true)
            .sync_interval(Duration::from_secs(1))
            .build()
            .unwrap(),
    );

    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.1"])]));
    settle().await;
    let last = vec![route("10.0.2.0/24", &["192.0.2.2"])];
    publisher.publish(snapshot(last.clone()));
    sleep(Duration::from_secs(5)).await;

    assert!(agent.calls().await.is_empty());
    assert!(agent.table().await.is_empty());
    assert_eq!(
        handle.get_current_route_table().await.unwrap(),
        RouteTable::from_routes(last)
    );
    let counters = handle.get_counters().await.unwrap();
    assert!(counters.full_syncs >= 5);
    assert_eq!(counters.agent.add_calls + counters.agent.sync_calls, 0);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_add_recovered_by_periodic_sync() {
    let (agent, publisher, handle) = start(config().periodic_sync(true).build().unwrap());
    settle().await;
    agent.fail_next(AgentOp::AddRoutes, 1).await;

    let routes = vec![route("10.0.1.0/24", &["192.0.2.1"])];
    publisher.publish(snapshot(routes.clone()));
    settle().await;

    assert!(handle.get_current_route_table().await.unwrap().is_empty());
    let health = handle.get_agent_health().await.unwrap();
    assert_eq!(health.consecutive_failures, 1);
    assert!(matches!(health.last_error, Some(AgentError::Transport(_))));
    let history = handle.get_perf_history().await.unwrap();
    assert_eq!(history.last().unwrap().last_descr(), Some(INSTALL_FAILED));

    sleep(Duration::from_secs(2)).await;

    let expected = RouteTable::from_routes(routes);
    assert_eq!(handle.get_current_route_table().await.unwrap(), expected);
    assert_eq!(agent.table().await, expected);
    assert!(handle.get_agent_health().await.unwrap().is_healthy());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn failed_add_recovered_by_next_snapshot() {
    let (agent, publisher, handle) = start(config().build().unwrap());
    agent.fail_next(AgentOp::AddRoutes, 1).await;

    let routes = vec![route("10.0.1.0/24", &["192.0.2.1"])];
    publisher.publish(snapshot(routes.clone()));
    settle().await;
    assert!(agent.table().await.is_empty());

    publisher.publish(snapshot(routes.clone()));
    settle().await;

    let calls = agent.calls().await;
    assert_eq!(adds(&calls).len(), 2);
    assert_eq!(agent.table().await, RouteTable::from_routes(routes));
    let counters = handle.get_counters().await.unwrap();
    assert_eq!(counters.delta_failures, 1);
    assert_eq!(counters.agent.add_failures, 1);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn ordered_install_adds_before_deletes() {
    let (agent, publisher, handle) = start(config().ordered_install(true).build().unwrap());

    publisher.publish(snapshot(vec![
        route("10.0.1.0/24", &["192.0.2.1"]),
        route("10.0.2.0/24", &["192.0.2.2"]),
    ]));
    settle().await;
    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.5"])]));
    settle().await;

    let calls = agent.calls().await;
    let tail = &calls[calls.len() - 2..];
    assert_eq!(
        tail,
        &[
            AgentCall::Add(vec![route("10.0.1.0/24", &["192.0.2.5"])]),
            AgentCall::Delete(vec!["10.0.2.0/24".parse().unwrap()]),
        ]
    );
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unordered_install_deletes_first() {
    let (agent, publisher, handle) = start(config().build().unwrap());

    publisher.publish(snapshot(vec![route("10.0.2.0/24", &["192.0.2.2"])]));
    settle().await;
    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.5"])]));
    settle().await;

    let calls = agent.calls().await;
    assert!(matches!(calls[calls.len() - 2], AgentCall::Delete(_)));
    assert!(matches!(calls[calls.len() - 1], AgentCall::Add(_)));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn wait_for_first_snapshot_suppresses_sync() {
    let (agent, publisher, handle) = start(
        config()
            .wait_for_first_snapshot(true)
            .periodic_sync(true)
            .sync_interval(Duration::from_secs(1))
            .build()
            .unwrap(),
    );
    sleep(Duration::from_millis(3500)).await;
    assert_eq!(agent.sync_count(), 0);

    let routes = vec![route("10.0.1.0/24", &["192.0.2.1"])];
    publisher.publish(snapshot(routes.clone()));
    settle().await;

    // the first snapshot is programmed with a full sync, not a delta
    assert_eq!(agent.sync_count(), 1);
    assert_eq!(agent.update_count(), 0);
    assert_eq!(agent.table().await, RouteTable::from_routes(routes.clone()));

    let mut more = routes.clone();
    more.push(route("10.0.2.0/24", &["192.0.2.2"]));
    publisher.publish(snapshot(more));
    settle().await;
    assert_eq!(agent.update_count(), 1);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn first_sync_waits_for_debounced_snapshot() {
    let (agent, publisher, handle) = start(
        config()
            .wait_for_first_snapshot(true)
            .periodic_sync(true)
            .sync_interval(Duration::from_secs(1))
            .build()
            .unwrap(),
    );
    // received at 995ms, the periodic deadline at 1s fires before the
    // debouncer releases it at 1005ms
    sleep(ms(995)).await;
    let routes = vec![route("10.0.1.0/24", &["192.0.2.1"])];
    publisher.publish(snapshot(routes.clone()));
    settle().await;

    assert_eq!(agent.calls().await, vec![AgentCall::Sync(routes.clone())]);
    assert_eq!(agent.table().await, RouteTable::from_routes(routes));
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn foreign_snapshot_is_dropped() {
    let (agent, publisher, handle) = start(config().build().unwrap());
    publisher.publish(RouteSnapshot::new(
        "node-2",
        vec![route("10.0.1.0/24", &["192.0.2.1"])],
    ));
    settle().await;

    assert_eq!(agent.update_count(), 0);
    let counters = handle.get_counters().await.unwrap();
    assert_eq!(counters.snapshots_dropped, 1);
    assert_eq!(counters.snapshots_received, 0);
    assert!(handle.get_perf_history().await.unwrap().is_empty());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn perf_chain_covers_every_stage() {
    let (_agent, publisher, handle) = start(config().build().unwrap());
    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.1"])]));
    settle().await;

    let history = handle.get_perf_history().await.unwrap();
    assert_eq!(history.len(), 1);
    let descrs: Vec<&str> = history[0]
        .events
        .iter()
        .map(|e| e.event_descr.as_str())
        .collect();
    assert_eq!(
        descrs,
        vec![
            SNAPSHOT_PUBLISHED,
            SNAPSHOT_RECEIVED,
            DEBOUNCE_RELEASED,
            DELTA_COMPUTED,
            ROUTES_INSTALLED,
        ]
    );
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn perf_history_is_bounded() {
    let (_agent, publisher, handle) = start(config().perf_history_size(3usize).build().unwrap());
    for i in 1..=5 {
        let hop = format!("192.0.2.{}", i);
        publisher.publish(snapshot(vec![route("10.0.1.0/24", &[hop.as_str()])]));
        settle().await;
    }
    assert_eq!(handle.get_perf_history().await.unwrap().len(), 3);
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stalled_agent_times_out() {
    let (agent, publisher, handle) = start(config().build().unwrap());
    settle().await;
    agent.set_delay(Duration::from_secs(5)).await;

    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.1"])]));
    sleep(Duration::from_secs(2)).await;

    let health = handle.get_agent_health().await.unwrap();
    assert_eq!(
        health.last_error,
        Some(AgentError::Timeout("addRoutes".to_string()))
    );
    assert!(handle.get_current_route_table().await.unwrap().is_empty());
    assert!(handle.is_running());
    handle.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn stop_discards_pending_snapshot() {
    let (agent, publisher, handle) = start(config().build().unwrap());
    settle().await;
    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.1"])]));
    sleep(ms(2)).await;

    handle.stop().await.unwrap();
    sleep(ms(100)).await;
    assert_eq!(agent.update_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stop_waits_for_in_flight_call() {
    let (agent, publisher, handle) = start(config().build().unwrap());
    settle().await;
    agent.set_delay(ms(500)).await;

    publisher.publish(snapshot(vec![route("10.0.1.0/24", &["192.0.2.1"])]));
    sleep(ms(20)).await;
    assert_eq!(agent.calls().await.len(), 2);

    handle.stop().await.unwrap();
    assert_eq!(agent.update_count(), 1);
    assert_eq!(agent.table().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn segment_routing_keeps_labels() {
    let labelled = UnicastRoute::new(
        "10.0.1.0/24".parse().unwrap(),
        vec![NextHop::new("192.0.2.1".parse().unwrap(), Some("eth0")).with_label(16001)],
    );

    let (agent, publisher, handle) = start(config().segment_routing(true).build().unwrap());
    publisher.publish(snapshot(vec![labelled.clone()]));
    settle().await;
    assert_eq!(adds(&agent.calls().await), vec![vec![labelled.clone()]]);
    handle.stop().await.unwrap();

    let (agent, publisher, handle) = start(config().build().unwrap());
    publisher.publish(snapshot(vec![labelled]));
    settle().await;
    assert_eq!(
        adds(&agent.calls().await),
        vec![vec![route("10.0.1.0/24", &["192.0.2.1"])]]
    );
    handle.stop().await.unwrap();
}
