//! distrual-node - worker process supervised by the hub

use clap::Parser;
use distrual_node::config::DEFAULT_LOG_LEVEL;
use distrual_node::{NodeAgent, NodeConfig};
use std::net::IpAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// distrual node - serves procedures and takes commands on stdin
#[derive(Parser, Debug)]
#[command(name = "distrual-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RPC port; an ephemeral port is used when omitted
    #[arg(short, long)]
    port: Option<u16>,

    /// Interface to bind
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = DEFAULT_LOG_LEVEL)]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Stdout carries the envelope protocol
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&args.log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = NodeConfig {
        log_level: args.log_level,
        ..NodeConfig::new()
    }
    .with_host(args.host)
    .with_port(args.port);

    NodeAgent::new(config)?.run(tokio::io::stdin()).await?;

    // The stdin reader thread cannot be cancelled; do not wait for it
    std::process::exit(0);
}
