use anyhow::{Context, Result};
use clap::Parser;
use std::net::{IpAddr, Ipv6Addr};
use std::sync::Arc;
use std::time::Duration;

use ipnet::{IpNet, Ipv6Net};
use ufib::agent::MockAgent;
use ufib::config::SyncConfigBuilder;
use ufib::fib::{self, Fib, FibContext};
use ufib::perf::LatencyBreakdown;
use ufib::route::{NextHop, RouteSnapshot, UnicastRoute};

const NODE_NAME: &str = "node-1";
const IFNAME: &str = "vethTestY";

/// Measures how long route snapshots take to travel through the Fib pipeline
/// into an in-memory forwarding agent.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opt {
    /// Number of prefixes in the route table
    #[arg(short, long, default_value_t = 1000)]
    prefixes: usize,

    /// Nexthops per route
    #[arg(short, long, default_value_t = 128)]
    nexthops: usize,

    /// Prefixes given new nexthops on every iteration
    #[arg(short, long, default_value_t = 10)]
    delta_size: usize,

    #[arg(short, long, default_value_t = 100)]
    iterations: u32,
}

/// xorshift64, enough to scatter prefixes and nexthops.
struct Scatter(u64);

impl Scatter {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn prefix(&mut self) -> IpNet {
        let addr = (0xfd00u128 << 112) | ((self.next() as u128) << 48) | (self.next() as u128 & 0xffff_ffff_ffff);
        IpNet::V6(Ipv6Net::from(Ipv6Addr::from(addr)))
    }

    fn next_hops(&mut self, n: usize) -> Vec<NextHop> {
        (0..n)
            .map(|_| {
                let addr = (0xfe80u128 << 112) | self.next() as u128;
                NextHop::new(IpAddr::V6(Ipv6Addr::from(addr)), Some(IFNAME))
            })
            .collect()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::parse();

    let sync = SyncConfigBuilder::default()
        .node_name(NODE_NAME)
        .periodic_sync(true)
        .sync_interval(Duration::from_secs(2))
        .wait_for_first_snapshot(false)
        .build()
        .map_err(anyhow::Error::msg)
        .context("invalid bench configuration")?;
    let agent = Arc::new(MockAgent::new());
    let (publisher, snapshots) = fib::channel(1);
    let handle = Fib::new(FibContext::new(sync, agent.clone())).spawn(snapshots);

    // fib starts from an empty table and syncs it right away
    agent.wait_for_syncs(1).await;

    let mut scatter = Scatter(0x9e37_79b9_7f4a_7c15);
    let prefixes: Vec<IpNet> = (0..opt.prefixes).map(|_| scatter.prefix()).collect();
    let mut routes: Vec<UnicastRoute> = prefixes
        .iter()
        .map(|p| UnicastRoute::new(*p, scatter.next_hops(opt.nexthops)))
        .collect();

    let mut updates = agent.update_count();
    publisher.publish(RouteSnapshot::new(NODE_NAME, routes.clone()));
    agent.wait_for_updates(updates + 1).await;

    let delta_size = opt.delta_size.min(opt.prefixes);
    let mut totals = [0u64; 3];
    let mut samples = 0u64;

    for _ in 0..opt.iterations {
        for route in routes.iter_mut().take(delta_size) {
            *route = UnicastRoute::new(route.dest, scatter.next_hops(opt.nexthops));
        }
        updates = agent.update_count();
        publisher.publish(RouteSnapshot::new(NODE_NAME, routes.clone()));
        agent.wait_for_updates(updates + 1).await;

        let history = handle.get_perf_history().await?;
        match history.last().map(LatencyBreakdown::from_chain) {
            Some(LatencyBreakdown {
                route_receive: Some(receive),
                debounce: Some(debounce),
                route_install: Some(install),
            }) => {
                totals[0] += receive;
                totals[1] += debounce;
                totals[2] += install;
                samples += 1;
            }
            _ => log::info!("perf history has no complete chain for this iteration"),
        }
    }

    let samples = samples.max(1);
    println!(
        "prefixes: {} nexthops: {} delta: {} iterations: {}",
        opt.prefixes, opt.nexthops, delta_size, opt.iterations
    );
    println!("route_receive: {} ms", totals[0] / samples);
    println!("debounce: {} ms", totals[1] / samples);
    println!("route_install: {} ms", totals[2] / samples);

    handle.stop().await?;
    Ok(())
}
