//! Gateway binary: loads a `GatewayConfig` TOML file, wires the router/health
//! monitor/cache synchronizer, and serves `POST /v1/messages` over HTTP.

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use gateway_core::GatewayConfig;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Anthropic-compatible cluster gateway")]
struct Args {
    /// Path to the cluster config TOML (§6 `discovery`/`health`/`cache`/`routing`).
    #[arg(long, env = "GATEWAY_CONFIG")]
    config: PathBuf,

    /// Address to listen on for the Anthropic-compatible HTTP surface.
    #[arg(long, env = "GATEWAY_LISTEN", default_value = "127.0.0.1:8089")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let _ = config::load_and_apply("gateway", None);
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let text = std::fs::read_to_string(&args.config)?;
    let cfg = GatewayConfig::from_toml(&text)?;
    info!(nodes = cfg.discovery.nodes.len(), "loaded cluster config");

    let mut handles = serve::build(&cfg, None);
    handles.run_initial_warmup().await;
    handles.health_monitor.start();
    handles.cache_synchronizer.start();

    let app = serve::app::router(handles.state.clone());
    let listener = tokio::net::TcpListener::bind(args.listen).await?;
    info!(addr = %args.listen, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    handles.health_monitor.stop();
    handles.cache_synchronizer.stop();
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
