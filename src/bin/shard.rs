//! Shard server binary

use anyhow::Result;
use clap::{Parser, ValueEnum};
use ringstore::common::{Config, NodeRole, RoutePolicy};
use ringstore::ShardNode;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RoleArg {
    Coordinator,
    Member,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RouteArg {
    Reject,
    Forward,
}

#[derive(Parser, Debug)]
#[command(name = "ringstore-shard")]
#[command(about = "ringstore storage shard")]
#[command(version)]
struct Args {
    /// TOML config file (CLI flags take priority)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Ring position of this shard
    #[arg(long)]
    id: Option<u32>,

    /// Explicit role; inferred as `member` when --coordinator is given
    #[arg(long, value_enum)]
    role: Option<RoleArg>,

    /// Coordinator gRPC address (host:port)
    #[arg(long)]
    coordinator: Option<String>,

    /// Number of shards in the ring, coordinator included
    #[arg(long)]
    num_nodes: Option<usize>,

    /// Bind address for gRPC
    #[arg(long)]
    bind: Option<String>,

    /// Address announced to peers and clients
    #[arg(long)]
    advertise: Option<String>,

    /// What to do with calls for keys owned by another shard
    #[arg(long, value_enum)]
    route_policy: Option<RouteArg>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

fn build_config(args: Args) -> Result<Config> {
    let mut config = Config::load(args.config.as_deref())?;
    let shard = &mut config.shard;

    if let Some(id) = args.id {
        shard.node_id = id;
    }
    if let Some(addr) = args.coordinator {
        shard.coordinator_addr = Some(addr);
        shard.role = NodeRole::Member;
    }
    match args.role {
        Some(RoleArg::Coordinator) => shard.role = NodeRole::Coordinator,
        Some(RoleArg::Member) => shard.role = NodeRole::Member,
        None => {}
    }
    if let Some(n) = args.num_nodes {
        shard.num_nodes = n;
    }
    if let Some(bind) = args.bind {
        shard.bind_addr = bind.parse()?;
    }
    if let Some(advertise) = args.advertise {
        shard.advertise_addr = Some(advertise);
    }
    match args.route_policy {
        Some(RouteArg::Reject) => shard.route_policy = RoutePolicy::Reject,
        Some(RouteArg::Forward) => shard.route_policy = RoutePolicy::Forward,
        None => {}
    }
    if let Some(level) = args.log_level {
        config.log_level = level;
    }

    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = build_config(Args::parse())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let node = ShardNode::bind(config).await?;
    node.serve().await?;

    Ok(())
}
