//! Simulated cluster walkthrough
//!
//! Starts a handful of in-process nodes, registers a service endpoint on each,
//! watches the service address and then lets the nodes leave one at a time
//! until the watch reports that the address is gone.

use anyhow::{bail, Context};
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use sim_cluster::{
    ClusterConfig, ClusterContext, NodeId, NodeInfo, NodeListenerFn, RegistrationInfo,
    RegistrationSnapshot, SimulatedNode,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// In-process simulated cluster manager demo
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of simulated nodes
    #[arg(long, env = "SIM_NODES", default_value = "3")]
    nodes: usize,

    /// Address the nodes register their endpoints under
    #[arg(long, env = "SIM_ADDRESS", default_value = "svc.echo")]
    address: String,

    /// Registration watch poll interval in milliseconds
    #[arg(long, env = "SIM_POLL_INTERVAL_MS", default_value = "5")]
    poll_interval_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!("Starting simulated cluster");
    info!("  Version: {}", sim_cluster::VERSION);
    info!("  Nodes: {}", args.nodes);
    info!("  Address: {}", args.address);

    if args.nodes == 0 {
        bail!("--nodes must be at least 1");
    }

    let poll_interval = Duration::from_millis(args.poll_interval_ms);
    let config = ClusterConfig::default().with_poll_interval(poll_interval);
    let ctx = ClusterContext::with_config(config).context("invalid cluster configuration")?;

    let nodes = start_nodes(&ctx, args.nodes).await?;

    for (i, node) in nodes.iter().enumerate() {
        let node_id = node.node_id().context("node left unexpectedly")?;
        let endpoint = format!("{}:{}", node_id, 9000 + i);
        node.register(&args.address, RegistrationInfo::new(node_id, endpoint))
            .await?;
    }

    let ended = Arc::new(Notify::new());
    let watch = ctx.watch_registrations(&args.address);
    info!(
        address = %args.address,
        registrations = watch.initial_state().len(),
        "Watching address"
    );
    {
        let ended = Arc::clone(&ended);
        let address = args.address.clone();
        watch
            .set_update_handler(move |snapshot: RegistrationSnapshot| {
                info!(address = %address, registrations = snapshot.len(), "Registrations changed");
            })
            .set_end_handler(move || ended.notify_one());
    }
    watch.start()?;

    for node in &nodes {
        // let the watch observe every intermediate state
        tokio::time::sleep(poll_interval * 4).await;
        node.leave().await?;
    }

    let wait = poll_interval * 20 + Duration::from_secs(1);
    if tokio::time::timeout(wait, ended.notified()).await.is_err() {
        warn!(address = %args.address, "Watch did not report the end of the address");
    }
    watch.stop();

    let stats = ctx.stats();
    info!(
        joins = stats.registry.joins,
        leaves = stats.registry.leaves,
        notifications = stats.registry.notifications_queued,
        listener_failures = stats.registry.listener_failures,
        registered = stats.registrations.registered,
        purged = stats.registrations.purged,
        worker_tasks = stats.workers.completed,
        watch_ticks = watch.ticks(),
        "Simulation finished"
    );

    Ok(())
}

/// Create and join `count` nodes, each logging the membership changes it sees
async fn start_nodes(ctx: &Arc<ClusterContext>, count: usize) -> anyhow::Result<Vec<SimulatedNode>> {
    let mut nodes = Vec::with_capacity(count);

    for i in 0..count {
        let node = ctx.create_node();
        let name = format!("node-{i}");
        let added_by = name.clone();
        let left_by = name.clone();
        node.set_node_listener(Arc::new(NodeListenerFn::new(
            move |id: &NodeId| info!(observer = %added_by, node_id = %id, "Peer joined"),
            move |id: &NodeId| info!(observer = %left_by, node_id = %id, "Peer left"),
        )));

        let node_id = node
            .join()
            .await
            .with_context(|| format!("{name} failed to join"))?;
        let port = u16::try_from(5701 + i).context("too many nodes for port range")?;
        node.set_node_info(NodeInfo::new("127.0.0.1", port)).await?;

        info!(name = %name, node_id = %node_id, port, "Node started");
        nodes.push(node);
    }

    Ok(nodes)
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true))
            .init();
    }
}
