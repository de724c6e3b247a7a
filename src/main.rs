mod accrual;
mod api;
mod bootstrap;
mod config;
mod error;
mod ledger;
mod luhn;
mod server;

use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,accrual_backend=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting Accrual Backend");

    let config = config::Config::from_env()?;
    let components = bootstrap::initialize_components(&config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let poller = components.scheduler.start(shutdown_rx.clone());
    info!("✅ Accrual polling scheduler started");

    let app = server::create_app(components.state);
    let mut server_shutdown = shutdown_rx;
    server::run_server(app, &config.run_address, async move {
        let _ = server_shutdown.wait_for(|stop| *stop).await;
    })
    .await?;

    match tokio::time::timeout(config.shutdown_timeout(), poller).await {
        Ok(Ok(())) => info!("✓ Accrual polling finished"),
        Ok(Err(e)) => error!("❌ Accrual polling task failed: {:?}", e),
        Err(_) => warn!(
            "⚠️ Accrual polling did not stop within {:?}, exiting anyway",
            config.shutdown_timeout()
        ),
    }

    info!("👋 Shutdown complete");
    Ok(())
}
