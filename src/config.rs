use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, AppResult};

/// Process configuration, read once from the environment at startup
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub run_address: String,
    pub database_uri: String,
    pub accrual_system_address: String,
    pub database_max_connections: u32,
    pub accrual_batch_size: usize,
    pub accrual_poll_delay_ms: u64,
    pub accrual_request_timeout_ms: u64,
    pub shutdown_timeout_secs: u64,
}

/// Settings shared by the polling scheduler, dispatcher and accrual client
#[derive(Debug, Clone)]
pub struct ReconcileConfig {
    pub batch_size: usize,
    pub poll_delay: Duration,
    pub request_timeout: Duration,
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        Self::from_source(config::Environment::default())
    }

    fn from_source(env: config::Environment) -> AppResult<Self> {
        let settings = config::Config::builder()
            .set_default("run_address", "0.0.0.0:8080")?
            .set_default("database_max_connections", 10_i64)?
            .set_default("accrual_batch_size", 100_i64)?
            .set_default("accrual_poll_delay_ms", 2_000_i64)?
            .set_default("accrual_request_timeout_ms", 5_000_i64)?
            .set_default("shutdown_timeout_secs", 10_i64)?
            .add_source(env.try_parsing(true))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> AppResult<()> {
        if self.database_uri.trim().is_empty() {
            return Err(AppError::Config("DATABASE_URI must be set".to_string()));
        }
        if self.accrual_system_address.trim().is_empty() {
            return Err(AppError::Config("ACCRUAL_SYSTEM_ADDRESS must be set".to_string()));
        }
        if self.accrual_batch_size == 0 {
            return Err(AppError::Config("ACCRUAL_BATCH_SIZE must be positive".to_string()));
        }
        if self.accrual_request_timeout_ms == 0 {
            return Err(AppError::Config(
                "ACCRUAL_REQUEST_TIMEOUT_MS must be positive".to_string(),
            ));
        }
        if self.database_max_connections == 0 {
            return Err(AppError::Config(
                "DATABASE_MAX_CONNECTIONS must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn reconcile(&self) -> ReconcileConfig {
        ReconcileConfig {
            batch_size: self.accrual_batch_size,
            poll_delay: Duration::from_millis(self.accrual_poll_delay_ms),
            request_timeout: Duration::from_millis(self.accrual_request_timeout_ms),
        }
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
