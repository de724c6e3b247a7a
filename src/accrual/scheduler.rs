// Polling Scheduler - drives accrual reconciliation for the life of the process
//
// Each iteration:
// 1. Fetch up to `batch_size` NEW/PROCESSING orders, longest-unchecked first
// 2. Dispatch them to the worker pool and wait for every worker
// 3. Sleep `poll_delay` so the database is not hammered
//
// Shutdown is cooperative: once the signal is seen no new batch is fetched,
// an in-flight dispatch is allowed to finish.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::dispatcher::{DispatchReport, Dispatcher};
use crate::config::ReconcileConfig;
use crate::error::AppResult;
use crate::ledger::OrderStore;

/// Outcome of a single fetch-and-dispatch step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IterationReport {
    pub fetched: usize,
    pub dispatch: DispatchReport,
}

/// Accrual polling scheduler
pub struct PollingScheduler {
    config: ReconcileConfig,
    orders: Arc<dyn OrderStore>,
    dispatcher: Dispatcher,
}

impl PollingScheduler {
    pub fn new(config: ReconcileConfig, orders: Arc<dyn OrderStore>, dispatcher: Dispatcher) -> Self {
        Self {
            config,
            orders,
            dispatcher,
        }
    }

    /// Start the scheduler (runs in background until `shutdown` flips to true)
    pub fn start(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            batch_size = self.config.batch_size,
            poll_delay_ms = self.config.poll_delay.as_millis() as u64,
            "⏰ Accrual polling started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.run_iteration().await {
                Ok(report) if report.fetched > 0 => {
                    info!(
                        fetched = report.fetched,
                        applied = report.dispatch.applied,
                        unknown = report.dispatch.unknown,
                        failed = report.dispatch.failed,
                        rate_limited = report.dispatch.rate_limited,
                        "✓ Accrual iteration completed"
                    );
                }
                Ok(_) => debug!("No orders awaiting accrual"),
                Err(e) => error!("❌ Failed to fetch orders for accrual polling: {}", e),
            }

            if *shutdown.borrow() {
                break;
            }

            if !Self::pause(self.config.poll_delay, &mut shutdown).await {
                break;
            }
        }

        info!("🛑 Accrual polling stopped");
    }

    /// One fetch + dispatch round
    pub async fn run_iteration(&self) -> AppResult<IterationReport> {
        let batch = self.orders.fetch_pollable(self.config.batch_size).await?;
        let fetched = batch.len();
        let dispatch = self.dispatcher.dispatch(batch).await;

        Ok(IterationReport { fetched, dispatch })
    }

    /// Sleeps for `delay`; returns false if shutdown was requested meanwhile
    async fn pause(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
        let changed = tokio::select! {
            _ = tokio::time::sleep(delay) => return true,
            changed = shutdown.changed() => changed,
        };

        match changed {
            Ok(()) => !*shutdown.borrow(),
            // sender gone, nobody can stop us cleanly anymore
            Err(_) => false,
        }
    }
}
