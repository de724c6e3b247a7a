// Worker Pool Dispatcher - fans one batch of orders out to a bounded set of workers
//
// Workers are plain tokio tasks created for a single dispatch and joined
// before it returns. They share a queue and stop pulling from it as soon as
// the accrual system rate-limits them.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::client::{StatusOutcome, StatusSource};
use crate::ledger::models::{ApplyOutcome, Order};
use crate::ledger::OrderStore;

/// Number of workers for a batch of `batch_len` orders.
///
/// Assumes every request takes the whole `request_timeout`, which gives the
/// minimum number of requests one worker makes per minute. It is a tuning
/// heuristic for staying under the authority's limit, not a guarantee.
pub fn worker_count(batch_len: usize, request_timeout: Duration) -> usize {
    let timeout_ms = request_timeout.as_millis().max(1);
    let per_minute = ((60_000 / timeout_ms) as usize).max(1);
    batch_len.div_ceil(per_minute).max(1)
}

/// Counters for one dispatch
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub workers: usize,
    /// Verdicts written to the ledger
    pub applied: usize,
    /// Verdicts the ledger skipped (order already terminal)
    pub skipped: usize,
    pub unknown: usize,
    pub failed: usize,
    /// Workers that stopped on a rate-limit signal
    pub rate_limited: usize,
    /// Orders never attempted because every worker backed off
    pub unattempted: usize,
}

impl DispatchReport {
    fn merge(&mut self, other: &DispatchReport) {
        self.applied += other.applied;
        self.skipped += other.skipped;
        self.unknown += other.unknown;
        self.failed += other.failed;
        self.rate_limited += other.rate_limited;
    }
}

pub struct Dispatcher {
    source: Arc<dyn StatusSource>,
    orders: Arc<dyn OrderStore>,
    request_timeout: Duration,
}

impl Dispatcher {
    pub fn new(
        source: Arc<dyn StatusSource>,
        orders: Arc<dyn OrderStore>,
        request_timeout: Duration,
    ) -> Self {
        Self {
            source,
            orders,
            request_timeout,
        }
    }

    /// Processes `batch` and returns once every worker has exited
    pub async fn dispatch(&self, batch: Vec<Order>) -> DispatchReport {
        if batch.is_empty() {
            return DispatchReport::default();
        }

        let workers = worker_count(batch.len(), self.request_timeout);
        let queue = Arc::new(Mutex::new(VecDeque::from(batch)));

        info!(workers, batch = queue.lock().len(), "🔄 Dispatching accrual checks");

        let handles: Vec<_> = (0..workers)
            .map(|worker_id| {
                let queue = queue.clone();
                let source = self.source.clone();
                let orders = self.orders.clone();
                tokio::spawn(Self::run_worker(worker_id, queue, source, orders))
            })
            .collect();

        let mut report = DispatchReport {
            workers,
            ..Default::default()
        };

        for joined in futures::future::join_all(handles).await {
            match joined {
                Ok(worker_report) => report.merge(&worker_report),
                Err(e) => error!("❌ Accrual worker panicked: {:?}", e),
            }
        }

        report.unattempted = queue.lock().len();
        report
    }

    async fn run_worker(
        worker_id: usize,
        queue: Arc<Mutex<VecDeque<Order>>>,
        source: Arc<dyn StatusSource>,
        orders: Arc<dyn OrderStore>,
    ) -> DispatchReport {
        let mut report = DispatchReport::default();

        loop {
            // the guard must not live across an await
            let next = queue.lock().pop_front();
            let Some(order) = next else {
                break;
            };

            match source.check(&order.number).await {
                StatusOutcome::Resolved(update) => {
                    match orders
                        .apply_accrual_result(&order.number, update.status, update.accrual)
                        .await
                    {
                        Ok(ApplyOutcome::Applied) => {
                            if update.status.is_terminal() {
                                debug!(order = %order.number, status = %update.status, "Order reached final status");
                            }
                            report.applied += 1;
                        }
                        Ok(ApplyOutcome::Skipped) => report.skipped += 1,
                        Err(e) => {
                            error!(order = %order.number, "❌ Could not apply accrual result: {}", e);
                            report.failed += 1;
                        }
                    }
                }
                StatusOutcome::Unknown => {
                    info!(order = %order.number, "Order not registered in accrual system");
                    report.unknown += 1;
                }
                StatusOutcome::RateLimited => {
                    warn!(worker_id, order = %order.number, "⏸️ Accrual system rate limit hit, worker backing off");
                    report.rate_limited += 1;
                    break;
                }
                StatusOutcome::AuthorityError(reason) | StatusOutcome::Malformed(reason) => {
                    warn!(order = %order.number, %reason, "⚠️ Accrual check failed, will retry");
                    report.failed += 1;
                }
            }
        }

        report
    }
}
