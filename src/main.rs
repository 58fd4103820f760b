use anyhow::{Context, Result};
use clap::Parser;
use medreg::{AppState, JsonFileStore, Registry, RegistryConfig, build_router};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Medical test registry service
#[derive(Parser, Debug)]
#[command(name = "medreg")]
#[command(version)]
struct Cli {
    /// Listen address (overrides MEDREG_BIND_ADDR)
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Snapshot file (overrides MEDREG_SNAPSHOT_PATH)
    #[arg(short, long)]
    snapshot: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = RegistryConfig::from_env().context("failed to load configuration")?;
    if let Some(bind) = cli.bind {
        config = config.bind_addr(bind);
    }
    if let Some(snapshot) = cli.snapshot {
        config = config.snapshot_path(snapshot);
    }

    let store = Arc::new(JsonFileStore::new(&config.snapshot_path));
    let registry = Registry::open(store.as_ref());

    let app = build_router(AppState::new(registry.clone()));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;

    info!(
        bind_addr = %config.bind_addr,
        snapshot = %config.snapshot_path.display(),
        "registry started"
    );

    // The shutdown future drains the registry and writes the final snapshot
    // before the server stops. Its outcome is cached by the registry and
    // collected again after serve returns.
    let shutdown = {
        let registry = registry.clone();
        let store = Arc::clone(&store);
        async move {
            shutdown_signal().await;
            info!("termination signal received, draining");
            // Failures are logged by the registry and reported below.
            let _ = registry.shutdown(store).await;
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("server error")?;

    registry.shutdown(store).await.with_context(|| {
        format!("failed to save snapshot to {}", config.snapshot_path.display())
    })?;
    info!("registry terminated");

    Ok(())
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "medreg=debug,tower_http=info",
        1 => "medreg=trace,tower_http=debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
