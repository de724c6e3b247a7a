use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use super::identity::AuthenticatedUser;
use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::{
        models::{CreateOrderOutcome, WithdrawOutcome},
        BalanceStore, OrderStore, WithdrawalStore,
    },
    luhn,
};

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<dyn OrderStore>,
    pub balances: Arc<dyn BalanceStore>,
    pub withdrawals: Arc<dyn WithdrawalStore>,
}

/// GET /api/health
pub async fn health_check() -> &'static str {
    "ok"
}

/// Register an order number for accrual
/// POST /api/user/orders
///
/// - 202 newly accepted, 200 already uploaded by this user
/// - 409 uploaded by someone else, 422 number fails the Luhn check
pub async fn create_order(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    body: String,
) -> AppResult<StatusCode> {
    let number = body.trim();
    if !luhn::is_valid(number) {
        return Err(AppError::InvalidOrderNumber(number.to_string()));
    }

    match state.orders.create_order(user_id, number).await? {
        CreateOrderOutcome::Created(order) => {
            // the order is committed already; a missing row is created on first credit
            if let Err(e) = state.balances.open_balance(user_id).await {
                warn!(user_id, "⚠️ Could not open balance: {}", e);
            }
            info!(user_id, order = %order.number, "📥 Order accepted for accrual");
            Ok(StatusCode::ACCEPTED)
        }
        CreateOrderOutcome::AlreadyCreated => Ok(StatusCode::OK),
        CreateOrderOutcome::OwnedByAnother => {
            info!(user_id, order = %number, "Order number already claimed by another user");
            Ok(StatusCode::CONFLICT)
        }
    }
}

/// GET /api/user/orders
pub async fn list_orders(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<Response> {
    let orders = state.orders.orders_for_user(user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<OrderResponse> = orders.into_iter().map(OrderResponse::from).collect();
    Ok(Json(body).into_response())
}

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<Json<BalanceResponse>> {
    let summary = state.balances.get_balance(user_id).await?;
    Ok(Json(BalanceResponse::from(summary)))
}

/// Spend points against a new order
/// POST /api/user/balance/withdraw
///
/// - 402 when the balance does not cover `sum`
/// - the balance row is locked for the duration of the debit
pub async fn withdraw(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
    Json(request): Json<WithdrawRequest>,
) -> AppResult<StatusCode> {
    let number = request.order.trim();
    if !luhn::is_valid(number) {
        return Err(AppError::InvalidOrderNumber(number.to_string()));
    }

    match state.balances.withdraw(user_id, number, request.sum).await? {
        WithdrawOutcome::Completed(withdrawal) => {
            info!(user_id, order = %withdrawal.order_number, sum = %withdrawal.sum, "💸 Withdrawal completed");
            Ok(StatusCode::OK)
        }
        WithdrawOutcome::InsufficientFunds { available, requested } => {
            info!(user_id, %available, %requested, "Withdrawal rejected: insufficient funds");
            Ok(StatusCode::PAYMENT_REQUIRED)
        }
    }
}

/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> AppResult<Response> {
    let withdrawals = state.withdrawals.withdrawals_for_user(user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }

    let body: Vec<WithdrawalResponse> = withdrawals
        .into_iter()
        .map(WithdrawalResponse::from)
        .collect();
    Ok(Json(body).into_response())
}
