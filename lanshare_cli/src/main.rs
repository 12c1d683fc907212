use anyhow::{Context, Result};
use clap::Parser;
use lanshare_core::config::NodeConfig;
use lanshare_core::identity::NodeIdentity;
use lanshare_core::{AppCommand, AppEvent, run_backend};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod app;
mod menu;

/// Share files with other machines on the local network
#[derive(Parser, Debug)]
#[command(name = "lanshare", version, about)]
struct Args {
    /// Config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Name announced to other peers
    #[arg(long)]
    name: Option<String>,

    /// Where received files are stored
    #[arg(long)]
    receive_dir: Option<PathBuf>,

    /// TCP port for incoming transfers
    #[arg(long)]
    port: Option<u16>,

    /// UDP port for presence broadcasts
    #[arg(long)]
    discovery_port: Option<u16>,

    /// Write the effective config to the config path and exit
    #[arg(long)]
    init_config: bool,
}

fn load_config(args: &Args) -> Result<NodeConfig> {
    let mut config = NodeConfig::load_layered(args.config.as_deref(), None)?;

    if let Some(name) = &args.name {
        config.display_name = Some(name.clone());
    }
    if let Some(dir) = &args.receive_dir {
        config.receive_dir = dir.clone();
    }
    if let Some(port) = args.port {
        config.transfer_port = port;
    }
    if let Some(port) = args.discovery_port {
        config.discovery_port = port;
    }

    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    // 0. Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    if args.init_config {
        let path = args
            .config
            .clone()
            .or_else(NodeConfig::default_path)
            .context("No config location available on this platform")?;
        config.save(&path)?;
        println!("Config written to {}", path.display());
        return Ok(());
    }

    let identity = NodeIdentity::detect(config.display_name.as_deref());

    // 1. Create channels (bounded with capacity 1000 for backpressure)
    let (tx_cmd, rx_cmd) = mpsc::channel::<AppCommand>(1000);
    let (tx_event, rx_event) = mpsc::channel::<AppEvent>(1000);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;

    rt.block_on(async move {
        // 2. Spawn backend and event printer
        let backend = tokio::spawn(run_backend(config, identity, rx_cmd, tx_event));
        let printer = tokio::spawn(app::print_events(rx_event));

        // 3. Run the menu until the user exits
        let menu_result = menu::run(tx_cmd.clone()).await;
        let _ = tx_cmd.send(AppCommand::Shutdown).await;
        drop(tx_cmd);

        if let Err(e) = backend.await {
            tracing::error!("Backend task failed: {}", e);
        }
        let _ = printer.await;
        menu_result
    })
}
