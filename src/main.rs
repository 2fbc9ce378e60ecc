use std::path::PathBuf;

use clap::Parser;
use loadbalancer::{config::Algorithm, Config, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// HTTP reverse proxy and load balancer.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "./config.toml")]
    config: PathBuf,

    /// Overrides the listening port of the configuration file.
    #[arg(short, long)]
    port: Option<u16>,

    /// Overrides the scheduling algorithm of the configuration file
    /// ("roundrobin" or "averageresponsetime").
    #[arg(short, long)]
    algorithm: Option<Algorithm>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "loadbalancer=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.config).await?;

    if let Some(port) = args.port {
        config.port = port;
    }

    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }

    tracing::info!(
        "loadbalancer v{} starting with config {}",
        loadbalancer::VERSION,
        args.config.display()
    );

    Server::init(config)?
        .shutdown_on(tokio::signal::ctrl_c())
        .run()
        .await?;

    Ok(())
}
