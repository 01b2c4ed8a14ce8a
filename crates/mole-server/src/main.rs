//! mole: hand a link from one device to another

use anyhow::{Context, Result};
use clap::Parser;
use mole_server::{MoleServer, ServerConfig};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "mole")]
#[command(about = "Send a link to a waiting browser", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "mole.toml")]
    config: PathBuf,

    /// Address to bind, overrides the config file
    #[arg(long)]
    bind: Option<String>,

    /// Public base URL, overrides the config file
    #[arg(long)]
    base_url: Option<String>,

    /// Public WebSocket base URL, overrides the config file
    #[arg(long)]
    ws_base_url: Option<String>,

    /// Static asset directory, overrides the config file
    #[arg(long)]
    static_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = ServerConfig::load(&cli.config)?;
    config.merge_with_env();
    if let Some(bind) = cli.bind {
        config.bind_address = bind;
    }
    if let Some(base_url) = cli.base_url {
        config.base_url = base_url;
    }
    if let Some(ws_base_url) = cli.ws_base_url {
        config.ws_base_url = ws_base_url;
    }
    if let Some(static_dir) = cli.static_dir {
        config.static_dir = static_dir;
    }
    config.validate().context("invalid configuration")?;

    info!(
        "Starting mole (base {}, slot ttl {}s)",
        config.base_url, config.rendezvous.slot_ttl_secs
    );

    MoleServer::new(config).start().await
}

fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info"))
    };

    // Ignore error if already set (e.g., during tests).
    let _ = fmt().with_env_filter(env_filter).try_init();
}
