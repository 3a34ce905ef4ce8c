//! The parlor game server.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use parlor::runtime::{ConnectionHub, ShutdownCoordinator};
use parlor::server::{self, AppState, ServerConfig};
use parlor::{Broadcast, Clock, FileStore, Ledger, MemoryStore, StoreLedger, SystemClock};

/// Multiplayer mini-game server.
#[derive(Debug, Parser)]
#[command(name = "parlor", version, about)]
struct Args {
    /// Listen address; overrides the config file.
    #[arg(long, env = "PARLOR_BIND")]
    bind: Option<SocketAddr>,
    /// TOML configuration file.
    #[arg(long, env = "PARLOR_CONFIG")]
    config: Option<PathBuf>,
    /// RNG seed for the sessions; overrides the config file.
    #[arg(long, env = "PARLOR_SEED")]
    seed: Option<u64>,
    /// Log as JSON lines.
    #[arg(long = "log-json", env = "PARLOR_LOG_JSON")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn open_ledger(config: &ServerConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Arc<dyn Ledger>> {
    let settings = &config.ledger;
    Ok(match &settings.path {
        Some(path) => {
            let store = FileStore::open(path)
                .with_context(|| format!("failed to open ledger file {}", path.display()))?;
            Arc::new(StoreLedger::new(
                store,
                settings.starting_balance,
                settings.profit_cap,
                clock,
            ))
        }
        None => Arc::new(StoreLedger::new(
            MemoryStore::new(),
            settings.starting_balance,
            settings.profit_cap,
            clock,
        )),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_json);

    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let seed = args.seed.or(config.seed).unwrap_or_else(|| clock.now_ms());
    let ledger = open_ledger(&config, clock.clone())?;

    let hub = Arc::new(ConnectionHub::new());
    let broadcast: Arc<dyn Broadcast> = hub.clone();
    let token = CancellationToken::new();
    let sessions = server::spawn_sessions(&config, seed, ledger, &clock, &broadcast, &token);

    let coordinator = ShutdownCoordinator::new(broadcast, config.shutdown_grace, token.clone())
        .with_sessions(&sessions);
    let app = server::router(AppState::new(sessions, hub, token));

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.bind))?;
    info!(bind = %config.bind, seed, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!(%err, "failed to listen for ctrl-c");
            }
            let report = coordinator.shutdown().await.total();
            info!(
                refunded = report.total_credited(),
                pending = report.total_pending(),
                "sessions drained"
            );
        })
        .await
        .context("server error")?;

    Ok(())
}
