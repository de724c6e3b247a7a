use async_trait::async_trait;
use rust_decimal::Decimal;

use super::models::*;
use crate::error::{AppError, AppResult};

/// Order lifecycle: registration, listing, and the poller's read/write path
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create_order(&self, user_id: i64, number: &str) -> AppResult<CreateOrderOutcome>;

    /// Newest upload first
    async fn orders_for_user(&self, user_id: i64) -> AppResult<Vec<Order>>;

    /// Up to `limit` NEW/PROCESSING orders, never-checked first, then by
    /// oldest `updated_at`
    ///
    /// Orders the authority does not know (204) are left untouched and keep
    /// a NULL `updated_at`, so enough of them can hold the head of every batch.
    async fn fetch_pollable(&self, limit: usize) -> AppResult<Vec<Order>>;

    /// Writes the authority's verdict and, when `accrual` is present, credits
    /// the owner's balance in the same transaction.
    async fn apply_accrual_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> AppResult<ApplyOutcome>;
}

#[async_trait]
pub trait BalanceStore: Send + Sync {
    /// Creates an empty balance if the user has none
    async fn open_balance(&self, user_id: i64) -> AppResult<()>;

    async fn get_balance(&self, user_id: i64) -> AppResult<BalanceSummary>;

    /// Debits `sum` and records the withdrawal atomically. Concurrent
    /// withdrawals for one user are serialized.
    async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        sum: Decimal,
    ) -> AppResult<WithdrawOutcome>;
}

#[async_trait]
pub trait WithdrawalStore: Send + Sync {
    /// Newest first
    async fn withdrawals_for_user(&self, user_id: i64) -> AppResult<Vec<Withdrawal>>;
}

/// Checks the accrual-iff-processed invariant before anything is written
pub(crate) fn validate_accrual(status: OrderStatus, accrual: Option<Decimal>) -> AppResult<()> {
    match (status, accrual) {
        (OrderStatus::Processed, Some(amount)) if amount.is_sign_negative() => Err(
            AppError::InvalidInput(format!("negative accrual {}", amount)),
        ),
        (OrderStatus::Processed, Some(_)) => Ok(()),
        (OrderStatus::Processed, None) => Err(AppError::InvalidInput(
            "PROCESSED order requires an accrual".to_string(),
        )),
        (other, Some(_)) => Err(AppError::InvalidInput(format!(
            "accrual is only allowed for PROCESSED orders, got {}",
            other
        ))),
        (_, None) => Ok(()),
    }
}

pub(crate) fn validate_withdrawal_sum(sum: Decimal) -> AppResult<()> {
    if sum <= Decimal::ZERO {
        return Err(AppError::InvalidInput(format!(
            "withdrawal sum must be positive, got {}",
            sum
        )));
    }
    Ok(())
}
