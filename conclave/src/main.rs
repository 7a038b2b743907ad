mod server;

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::info;

use conclave_api::{AppState, RelayNotifier};
use conclave_core::{bootstrap::load_config, logging};
use conclave_relay::Relay;
use conclave_sfu::{LocalEngine, SfuManager};

/// SFU session orchestration and signaling relay
#[derive(Debug, Parser)]
#[command(name = "conclave", version, about)]
struct Args {
    /// Path to a YAML config file
    #[arg(short, long, env = "CONCLAVE_CONFIG_PATH")]
    config: Option<String>,

    /// Address to bind the HTTP server to
    #[arg(long)]
    host: Option<String>,

    /// HTTP port (overrides `PORT` and the config file)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load configuration, CLI flags win
    let mut config = load_config(args.config.as_deref())?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Err(errors) = config.validate() {
        anyhow::bail!("Invalid command line overrides: {}", errors.join("; "));
    }

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Conclave server starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Registries
    let relay = Arc::new(Relay::new(config.relay.clone()));
    let sfu = SfuManager::new(
        config.sfu.clone(),
        Arc::new(LocalEngine::new()),
        Arc::new(RelayNotifier::new(Arc::clone(&relay))),
    );

    // 4. Serve until a shutdown signal arrives
    let router = conclave_api::create_router(AppState {
        sfu: Arc::clone(&sfu),
        relay,
    });
    server::serve(&config.http_address(), router).await?;

    sfu.shutdown();
    info!("Conclave server stopped");
    Ok(())
}
