//! caretaker server entry point.
//!
//! Loads configuration, verifies the external collaborators (container
//! runtime, revocation store, central store — all fatal when unreachable),
//! then serves the HTTP control plane with an idle reaper running alongside.
//! Shutdown stops accepting requests and closes the central store; tenant
//! containers are deliberately left running for the reaper or the operator.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use caretaker_core::central::CentralStore;
use caretaker_core::revocation::{RedisStore, RevocationStore};
use caretaker_runtime::ContainerRuntime;

use caretaker_server::config::ServerConfig;
use caretaker_server::state::AppState;
use caretaker_server::{reaper, routes};

/// Budget for each startup dependency probe.
const STARTUP_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env().context("invalid configuration")?;

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .json()
        .init();

    info!(public_url = %config.public_url, image = %config.tenant_image, "caretaker starting");

    // Container runtime — client construction and daemon reachability are
    // both fatal at startup.
    let runtime = Arc::new(ContainerRuntime::connect().context("container runtime client")?);
    tokio::time::timeout(STARTUP_PROBE_TIMEOUT, runtime.ping())
        .await
        .context("container runtime ping timed out")?
        .context("container runtime unreachable")?;

    // Revocation store.
    let revocations: Arc<dyn RevocationStore> = Arc::new(
        tokio::time::timeout(STARTUP_PROBE_TIMEOUT, RedisStore::connect(&config.redis_url))
            .await
            .context("revocation store connect timed out")?
            .context("revocation store unreachable")?,
    );
    tokio::time::timeout(STARTUP_PROBE_TIMEOUT, revocations.ping())
        .await
        .context("revocation store ping timed out")?
        .context("revocation store ping failed")?;

    // Central analytics store.
    let central = CentralStore::open(&config.central_db_path)
        .await
        .with_context(|| format!("failed to open central store at {}", config.central_db_path))?;

    let bind_addr = config.bind_addr;
    let state = AppState::new(config, revocations, central, runtime)?;

    // Shutdown signal channel.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Spawn the idle reaper.
    let reaper_handle = {
        let state = Arc::clone(&state);
        let mut rx = shutdown_rx.clone();
        tokio::spawn(async move {
            reaper::run(state, &mut rx).await;
        })
    };

    let app = routes::router(Arc::clone(&state));

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind to {bind_addr}"))?;

    info!(addr = %bind_addr, "caretaker listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(shutdown_tx))
    .await
    .context("server error")?;

    // Wait for the reaper to observe shutdown (with timeout).
    let _ = tokio::time::timeout(Duration::from_secs(10), reaper_handle).await;

    // Tenant containers are left running on purpose; only our handles close.
    state.central.close().await;

    info!("caretaker stopped");
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then broadcast shutdown.
async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.ok();
    };

    #[cfg(unix)]
    let terminate = async {
        if let Ok(mut sig) =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        {
            sig.recv().await;
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("shutdown signal received, stopping server");
    let _ = shutdown_tx.send(true);
}
