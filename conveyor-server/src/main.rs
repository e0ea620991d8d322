//! Conveyor delivery server
//!
//! Entry point: configuration loading, target wiring, snapshot restore, HTTP
//! intake, and snapshot-on-shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use conveyor_auth::AuthProvider;
use conveyor_dispatch::{PendingStore, PoolConfig, WorkerPool};
use conveyor_gateway::HttpGateway;
use conveyor_persistence::JobSnapshotFile;
use conveyor_server::state::AppState;
use conveyor_server::{bootstrap, build_router};

mod cli;
mod tracing_setup;

use cli::CliArgs;
use tracing_setup::install_tracing;

/// How long shutdown waits for workers before abandoning in-flight loops.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    if args.help_requested {
        CliArgs::print_help();
        return Ok(());
    }

    // Resolve config path: CLI > environment variable
    let config_path = args
        .config_path
        .or_else(|| std::env::var("CONVEYOR_CONFIG_PATH").ok());

    let config = conveyor_config::load_config(config_path.as_deref().map(Path::new))?;

    install_tracing(&config.logging);

    tracing::info!(
        target = %config.target.name,
        base_url = %config.target.base_url,
        workers = config.target.max_workers,
        queue_capacity = config.target.queue_capacity,
        repetitions = config.target.repetitions,
        backoff = ?config.target.backoff,
        "target configured"
    );

    let auth = AuthProvider::from_settings(&config.target.auth)?;
    let gateway = Arc::new(HttpGateway::new(config.target.clone(), auth));

    let store = PendingStore::new();
    let cancel = CancellationToken::new();
    let pool = Arc::new(WorkerPool::start(
        PoolConfig {
            workers: config.target.max_workers,
            queue_capacity: config.target.queue_capacity,
            backoff: config.target.backoff,
        },
        store.clone(),
        gateway,
        cancel.clone(),
    ));

    // Replay whatever the previous run left behind.
    let snapshot = JobSnapshotFile::new(&config.persistence.path);
    bootstrap::restore_pending(&snapshot, &store, &pool).await;

    let state = Arc::new(AppState::new(store.clone(), pool.clone()));
    let app = build_router(state);

    let listener = TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    tracing::info!(host = %config.server.host, port = config.server.port, "server listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Stop workers and retry loops before snapshotting so the save does not
    // race in-flight mutation.
    tracing::info!("shutting down; saving pending jobs");
    pool.shutdown(SHUTDOWN_GRACE).await;

    if let Err(err) = snapshot.save(&store.snapshot()).await {
        tracing::error!(error = %err, "failed to save pending jobs; outstanding work is lost");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
