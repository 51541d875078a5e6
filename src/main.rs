//! frontdoor server binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌───────────────────────────────────────────────┐
//!                         │                  FRONTDOOR                     │
//!     Client Request      │  ┌──────────┐   ┌───────────┐                  │
//!     ────────────────────┼─▶│ listener │──▶│  router   │─┬─▶ /_ui  static │
//!       (TLS or plain)    │  └──────────┘   └───────────┘ ├─▶ /_api app    │
//!                         │                               └─▶ /*  proxy ───┼──▶ Backend
//!                         │                                   node tree    │   (TLS or plain)
//!     WebSocket client    │  ┌──────────┐   ┌───────────┐                  │
//!     ────────────────────┼─▶│ ws port  │──▶│ broadcast │                  │
//!                         │  └──────────┘   └───────────┘                  │
//!                         └───────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;

use frontdoor::config::{load_config, FrontdoorConfig};
use frontdoor::http::{BroadcastHub, InfoApplication, ServerAssembler};
use frontdoor::lifecycle::{build_runtime, signals, Shutdown};
use frontdoor::observability::logging;

#[derive(Parser)]
#[command(name = "frontdoor")]
#[command(about = "TLS-aware front door: proxy, static assets, API and WebSocket", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => FrontdoorConfig::default(),
    };
    logging::init(&config.observability.log_level, cli.verbose)?;

    tracing::info!("frontdoor v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.server.bind_address,
        client_tls = config.tls.client_facing,
        backend_tls = config.tls.backend_facing,
        backend_host = %config.backend.host,
        "Configuration loaded"
    );

    let runtime = build_runtime(&config.server)?;
    runtime.block_on(serve(config))
}

async fn serve(config: FrontdoorConfig) -> Result<(), Box<dyn std::error::Error>> {
    let assembler = ServerAssembler::new(config, Arc::new(InfoApplication))?;

    let shutdown = Shutdown::new();
    signals::forward_signals(&shutdown);

    assembler
        .run(Arc::new(BroadcastHub::default()), &shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
