//! `atomkv` server binary.

use std::time::Duration;

use atomkv::{http, Engine, EngineConfig, KvError};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "atomkv", version, about = "In-memory key-value store with live updates over HTTP")]
struct Args {
    /// Server's host address
    #[arg(long, default_value = "0.0.0.0:8000")]
    addr: String,

    /// Seconds a key may stay untouched before it is deleted
    #[arg(long, default_value_t = 7 * 24 * 60 * 60)]
    expiry_secs: u64,

    /// Per-subscriber event buffer
    #[arg(long, default_value_t = atomkv::DEFAULT_SUBSCRIBER_BUFFER)]
    buffer: usize,
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<(), KvError> {
    init_logging();
    let args = Args::parse();

    let engine = Engine::new(EngineConfig {
        subscriber_buffer: args.buffer,
        expiry: Duration::from_secs(args.expiry_secs),
        ..Default::default()
    })?;

    let listener = TcpListener::bind(&args.addr).await?;
    info!(addr = %args.addr, "Listening");

    axum::serve(listener, http::router(engine.clone()))
        .with_graceful_shutdown(shutdown_signal(engine))
        .await?;
    Ok(())
}

/// Wait for Ctrl-C, then close the engine so open event streams end.
async fn shutdown_signal(engine: Engine) {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutting down");
    let _ = tokio::task::spawn_blocking(move || engine.close()).await;
}
