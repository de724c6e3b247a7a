use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, Type};
use std::fmt;

/// Local order status
///
/// PROCESSED and INVALID are terminal: the reconciliation engine never
/// polls a terminal order again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "order_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    New,
    Processing,
    Invalid,
    Processed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Invalid => "INVALID",
            OrderStatus::Processed => "PROCESSED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Invalid | OrderStatus::Processed)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Order entity
///
/// INVARIANT: `accrual.is_some()` iff `status == Processed`
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Order {
    pub id: i64,
    pub number: String,
    pub user_id: i64,
    pub status: OrderStatus,
    pub accrual: Option<Decimal>,
    pub uploaded_at: DateTime<Utc>,
    /// `None` until the first status result was applied
    pub updated_at: Option<DateTime<Utc>>,
}

/// Balance row, one per user
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserBalance {
    pub user_id: i64,
    pub current: Decimal,
}

/// Read model returned by get-balance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceSummary {
    pub current: Decimal,
    pub withdrawn: Decimal,
}

impl BalanceSummary {
    #[cfg(test)]
    pub fn empty() -> Self {
        Self {
            current: Decimal::ZERO,
            withdrawn: Decimal::ZERO,
        }
    }
}

/// Immutable debit entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Withdrawal {
    pub id: i64,
    pub user_id: i64,
    pub order_number: String,
    pub sum: Decimal,
    pub processed_at: DateTime<Utc>,
}

/// Result of registering an order number for a user
#[derive(Debug, Clone)]
pub enum CreateOrderOutcome {
    Created(Order),
    /// The requester already owns this number
    AlreadyCreated,
    /// Another user owns this number
    OwnedByAnother,
}

/// Result of applying an authority verdict to an order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    /// Order unknown or already terminal, nothing written
    Skipped,
}

/// Result of a withdrawal attempt
#[derive(Debug, Clone)]
pub enum WithdrawOutcome {
    Completed(Withdrawal),
    InsufficientFunds { available: Decimal, requested: Decimal },
}

impl WithdrawOutcome {
    #[cfg(test)]
    pub fn is_completed(&self) -> bool {
        matches!(self, WithdrawOutcome::Completed(_))
    }
}
