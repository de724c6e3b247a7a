use sqlx::{postgres::PgPoolOptions, PgPool};
use std::{sync::Arc, time::Duration};
use tracing::info;

use crate::{
    accrual::{AccrualClient, Dispatcher, PollingScheduler},
    api::handler::AppState,
    config::Config,
    error::AppResult,
    ledger::LedgerRepository,
};

/// Everything `main` needs to run the process
pub struct Components {
    pub state: AppState,
    pub scheduler: PollingScheduler,
}

pub async fn initialize_components(config: &Config) -> AppResult<Components> {
    info!("Initializing application components ...");

    let pool = initialize_database(&config.database_uri, config.database_max_connections).await?;
    let ledger = Arc::new(LedgerRepository::new(pool));

    let reconcile = config.reconcile();
    let client = Arc::new(AccrualClient::new(
        &config.accrual_system_address,
        reconcile.request_timeout,
    )?);
    info!("✅ Accrual client configured for {}", config.accrual_system_address);

    let dispatcher = Dispatcher::new(client, ledger.clone(), reconcile.request_timeout);
    let scheduler = PollingScheduler::new(reconcile, ledger.clone(), dispatcher);

    let state = AppState {
        orders: ledger.clone(),
        balances: ledger.clone(),
        withdrawals: ledger,
    };

    Ok(Components { state, scheduler })
}

async fn initialize_database(database_url: &str, max_connections: u32) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: {} max connections", max_connections);

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
