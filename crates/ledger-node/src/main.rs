use anyhow::Context;
use clap::Parser;
use ledger_core::{CancelFlag, Ledger, LedgerConfig};
use ledger_node::{router, AppState};
use ledger_storage::SledStore;
use std::{net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, warn, Level};

#[derive(Parser, Debug)]
struct Args {
    /// Address to listen on, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Data directory for sled
    #[arg(long, default_value = "./data")]
    data_dir: String,

    /// Keep the chain in memory only; it is rebuilt from genesis on restart
    #[arg(long)]
    in_memory: bool,

    /// TOML file with ledger settings (difficulty, mining budget, threads)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `default_difficulty` from the config file
    #[arg(long)]
    difficulty: Option<u32>,
}

async fn load_config(args: &Args) -> anyhow::Result<LedgerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("reading config {}", path.display()))?;
            LedgerConfig::from_toml_str(&text)
                .with_context(|| format!("parsing config {}", path.display()))?
        }
        None => LedgerConfig::default(),
    };
    if let Some(difficulty) = args.difficulty {
        config.default_difficulty = difficulty;
    }
    Ok(config)
}

async fn shutdown_signal(cancel: CancelFlag) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown requested, cancelling in-flight mining");
    cancel.cancel();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = load_config(&args).await?;
    info!(?config, "ledger config");

    let ledger = if args.in_memory {
        Ledger::new(config)
    } else {
        let store = Arc::new(SledStore::open(&args.data_dir)?);
        Ledger::with_store(config, store)?
    };
    let ledger = Arc::new(ledger);

    if !ledger.is_initialized() {
        let ledger = Arc::clone(&ledger);
        let genesis = tokio::task::spawn_blocking(move || ledger.initialize()).await??;
        info!(hash = %genesis.hash(), "ledger initialized");
    }

    let miner = ledger.miner();
    info!(budget = ?miner.budget(), threads = miner.threads(), "miner ready");
    let cancel = miner.cancel_flag().clone();
    let app = router(AppState::new(Arc::clone(&ledger)));

    let addr: SocketAddr = args.listen.parse()?;
    info!("ledger-node listening on http://{addr}");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    ledger.close()?;
    info!("ledger-node stopped");
    Ok(())
}
