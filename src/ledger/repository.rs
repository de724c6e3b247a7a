use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, info};

use super::models::*;
use super::store::{validate_accrual, validate_withdrawal_sum, BalanceStore, OrderStore, WithdrawalStore};
use crate::error::AppResult;

const ORDER_COLUMNS: &str = "id, number, user_id, status, accrual, uploaded_at, updated_at";

/// Ledger repository - THE source of truth for orders, balances and withdrawals
pub struct LedgerRepository {
    pub pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn begin_tx(&self) -> AppResult<Transaction<'_, Postgres>> {
        Ok(self.pool.begin().await?)
    }

    /// Locks the user's balance row until the transaction ends
    async fn balance_for_update(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
    ) -> AppResult<Option<UserBalance>> {
        let balance = sqlx::query_as::<_, UserBalance>(
            r#"
            SELECT user_id, balance AS current
            FROM user_balances
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(balance)
    }

    async fn credit(
        tx: &mut Transaction<'_, Postgres>,
        user_id: i64,
        amount: Decimal,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, balance)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET balance = user_balances.balance + EXCLUDED.balance
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

// ========== ORDER OPERATIONS ==========

#[async_trait]
impl OrderStore for LedgerRepository {
    async fn create_order(&self, user_id: i64, number: &str) -> AppResult<CreateOrderOutcome> {
        // ON CONFLICT keeps two concurrent uploads of one number from both inserting
        let inserted = sqlx::query_as::<_, Order>(&format!(
            r#"
            INSERT INTO orders (number, user_id, status, uploaded_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (number) DO NOTHING
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(number)
        .bind(user_id)
        .bind(OrderStatus::New)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(order) = inserted {
            info!(order = %order.number, user_id, "📝 Order registered");
            return Ok(CreateOrderOutcome::Created(order));
        }

        let owner = sqlx::query_scalar::<_, i64>("SELECT user_id FROM orders WHERE number = $1")
            .bind(number)
            .fetch_one(&self.pool)
            .await?;

        if owner == user_id {
            Ok(CreateOrderOutcome::AlreadyCreated)
        } else {
            Ok(CreateOrderOutcome::OwnedByAnother)
        }
    }

    async fn orders_for_user(&self, user_id: i64) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY uploaded_at DESC, id DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn fetch_pollable(&self, limit: usize) -> AppResult<Vec<Order>> {
        let orders = sqlx::query_as::<_, Order>(&format!(
            r#"
            SELECT {}
            FROM orders
            WHERE status IN ('NEW', 'PROCESSING')
            ORDER BY updated_at ASC NULLS FIRST, uploaded_at ASC, id ASC
            LIMIT $1
            "#,
            ORDER_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(orders)
    }

    async fn apply_accrual_result(
        &self,
        number: &str,
        status: OrderStatus,
        accrual: Option<Decimal>,
    ) -> AppResult<ApplyOutcome> {
        validate_accrual(status, accrual)?;

        let mut tx = self.begin_tx().await?;

        // The status guard makes a terminal order immutable, so a PROCESSED
        // verdict can credit at most once even if two dispatches overlap.
        let owner = sqlx::query_scalar::<_, i64>(
            r#"
            UPDATE orders
            SET status = $2, accrual = $3, updated_at = NOW()
            WHERE number = $1 AND status IN ('NEW', 'PROCESSING')
            RETURNING user_id
            "#,
        )
        .bind(number)
        .bind(status)
        .bind(accrual)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = owner else {
            tx.rollback().await?;
            debug!(order = %number, "Order missing or terminal, verdict skipped");
            return Ok(ApplyOutcome::Skipped);
        };

        if let Some(amount) = accrual {
            Self::credit(&mut tx, user_id, amount).await?;
        }

        tx.commit().await?;

        if let Some(amount) = accrual {
            info!(order = %number, user_id, %amount, "💰 Accrual credited");
        }

        Ok(ApplyOutcome::Applied)
    }
}

// ========== BALANCE OPERATIONS ==========

#[async_trait]
impl BalanceStore for LedgerRepository {
    async fn open_balance(&self, user_id: i64) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO user_balances (user_id, balance)
            VALUES ($1, 0)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_balance(&self, user_id: i64) -> AppResult<BalanceSummary> {
        let (current, withdrawn) = sqlx::query_as::<_, (Decimal, Decimal)>(
            r#"
            SELECT
                COALESCE((SELECT balance FROM user_balances WHERE user_id = $1), 0),
                COALESCE((SELECT SUM(sum) FROM withdrawals WHERE user_id = $1), 0)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(BalanceSummary { current, withdrawn })
    }

    async fn withdraw(
        &self,
        user_id: i64,
        order_number: &str,
        sum: Decimal,
    ) -> AppResult<WithdrawOutcome> {
        validate_withdrawal_sum(sum)?;

        let mut tx = self.begin_tx().await?;

        // Row lock serializes the read-check-decrement against concurrent
        // withdrawals for the same user
        let available = Self::balance_for_update(&mut tx, user_id)
            .await?
            .map(|b| b.current)
            .unwrap_or(Decimal::ZERO);

        if available < sum {
            tx.rollback().await?;
            return Ok(WithdrawOutcome::InsufficientFunds {
                available,
                requested: sum,
            });
        }

        let withdrawal = sqlx::query_as::<_, Withdrawal>(
            r#"
            INSERT INTO withdrawals (user_id, order_number, sum, processed_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, user_id, order_number, sum, processed_at
            "#,
        )
        .bind(user_id)
        .bind(order_number)
        .bind(sum)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("UPDATE user_balances SET balance = balance - $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(sum)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(user_id, order = %order_number, %sum, "💸 Withdrawal committed");
        Ok(WithdrawOutcome::Completed(withdrawal))
    }
}

// ========== WITHDRAWAL OPERATIONS ==========

#[async_trait]
impl WithdrawalStore for LedgerRepository {
    async fn withdrawals_for_user(&self, user_id: i64) -> AppResult<Vec<Withdrawal>> {
        let withdrawals = sqlx::query_as::<_, Withdrawal>(
            r#"
            SELECT id, user_id, order_number, sum, processed_at
            FROM withdrawals
            WHERE user_id = $1
            ORDER BY processed_at DESC, id DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(withdrawals)
    }
}
