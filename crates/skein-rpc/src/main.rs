//! Skein RPC Server - serves the demo `Random` component over the Skein transport.
//!
//! Both call styles are live: `GET /Random/randomInt?min=1&max=6` and
//! `POST /invoke?oid=Random-randomInt-1` with a `{"params": [1, 6]}` body.

mod server;
mod services;

use anyhow::Result;
use clap::Parser;
use skein_core::TransportConfig;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "skein-rpc")]
#[command(about = "Skein RPC server")]
struct Args {
    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, default_value_t = TransportConfig::DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(long, default_value = TransportConfig::DEFAULT_HOST)]
    host: String,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Pretty-print JSON response bodies
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    info!("Starting Skein RPC Server");

    let mut handle = server::start_server(&args.host, args.port, args.pretty).await?;

    // Print port for launchers and tests to read (intentional stdout)
    println!("RPC_PORT={}", handle.port());

    info!("RPC server running on {}", handle.addr());

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, exiting");

    handle.shutdown();
    handle.wait().await;

    Ok(())
}
