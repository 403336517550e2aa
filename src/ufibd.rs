use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::{sleep, Duration};

use ufib::config;
use ufib::fib::{self, Fib, FibContext, SnapshotPublisher};
use ufib::perf::LatencyBreakdown;
use ufib::route::RouteSnapshot;

const SNAPSHOT_CHANNEL_SIZE: usize = 16;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Opt {
    #[arg(short, long, value_parser, default_value = "ufibd.conf")]
    config: PathBuf,

    /// Static route table to publish, overrides `routes_file` from the config
    #[arg(short, long, value_parser)]
    routes: Option<PathBuf>,
}

fn publish_route_file(publisher: &SnapshotPublisher, node_name: &str, path: &Path) {
    match fib::load_route_file(path) {
        Ok(routes) => {
            log::info!("publishing {} routes from {}", routes.len(), path.display());
            publisher.publish(RouteSnapshot::new(node_name, routes));
        }
        Err(e) => log::error!("failed to load routes from {}: {}", path.display(), e),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let opt = Opt::parse();
    let config = config::read_config(&opt.config)
        .with_context(|| format!("failed to read config {}", opt.config.display()))?;
    let sync = config.sync_config().context("invalid configuration")?;
    let routes_file = opt.routes.or_else(|| config.routes_file.clone());
    log::info!("config: {:?}", sync);

    let node_name = sync.node_name.clone();
    let ctx = FibContext::from_config(sync)
        .await
        .context("failed to set up forwarding agent")?;
    let (publisher, snapshots) = fib::channel(SNAPSHOT_CHANNEL_SIZE);
    let handle = Fib::new(ctx).spawn(snapshots);

    if let Some(path) = &routes_file {
        publish_route_file(&publisher, &node_name, path);
    }

    let mut hangup = signal(SignalKind::hangup()).context("failed to install SIGHUP handler")?;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                log::info!("interrupted, shutting down");
                break;
            }
            _ = hangup.recv() => match &routes_file {
                Some(path) => publish_route_file(&publisher, &node_name, path),
                None => log::info!("SIGHUP received but no route file configured"),
            },
            _ = sleep(Duration::from_secs(1)) => {
                if !handle.is_running() {
                    log::error!("fib event loop exited");
                    break;
                }
            }
        }
    }

    if handle.is_running() {
        for chain in handle.get_perf_history().await? {
            let b = LatencyBreakdown::from_chain(&chain);
            log::info!(
                "perf: {:?} total {} ms (receive {:?}, debounce {:?}, install {:?})",
                chain.last_descr(),
                chain.total_ms(),
                b.route_receive,
                b.debounce,
                b.route_install
            );
        }
    }
    handle.stop().await?;
    Ok(())
}
