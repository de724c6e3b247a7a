//! Behaviour every ledger backend must share. Each backend's test module
//! calls [`run_all`] with a fresh store.
//!
//! `MemoryLedger` holds one lock over all state, so its run of the
//! concurrent withdrawal case cannot catch a broken `FOR UPDATE` in the
//! Postgres repository. That path is only covered by the ignored Postgres
//! run: `TEST_DATABASE_URL=... cargo test -- --ignored`.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use super::models::*;
use super::store::{BalanceStore, OrderStore, WithdrawalStore};

pub trait Ledger: OrderStore + BalanceStore + WithdrawalStore + 'static {}

impl<T: OrderStore + BalanceStore + WithdrawalStore + 'static> Ledger for T {}

pub async fn run_all<L: Ledger>(ledger: Arc<L>) {
    order_ownership(ledger.as_ref()).await;
    pollable_ordering_excludes_terminal(ledger.as_ref()).await;
    credit_is_at_most_once(ledger.as_ref()).await;
    rejects_inconsistent_verdicts(ledger.as_ref()).await;
    withdrawal_boundary(ledger.as_ref()).await;
    concurrent_withdrawals(ledger.clone()).await;
    balance_matches_history(ledger.as_ref()).await;
    empty_balances(ledger.as_ref()).await;
}

async fn credit<L: Ledger>(ledger: &L, user_id: i64, number: &str, amount: Decimal) {
    assert!(matches!(
        ledger.create_order(user_id, number).await.unwrap(),
        CreateOrderOutcome::Created(_)
    ));
    let outcome = ledger
        .apply_accrual_result(number, OrderStatus::Processed, Some(amount))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);
}

async fn order_ownership<L: Ledger>(ledger: &L) {
    let created = ledger.create_order(1, "100001").await.unwrap();
    match created {
        CreateOrderOutcome::Created(order) => {
            assert_eq!(order.user_id, 1);
            assert_eq!(order.status, OrderStatus::New);
            assert!(order.accrual.is_none());
            assert!(order.updated_at.is_none());
        }
        other => panic!("expected Created, got {:?}", other),
    }

    assert!(matches!(
        ledger.create_order(1, "100001").await.unwrap(),
        CreateOrderOutcome::AlreadyCreated
    ));
    assert!(matches!(
        ledger.create_order(2, "100001").await.unwrap(),
        CreateOrderOutcome::OwnedByAnother
    ));

    assert_eq!(ledger.orders_for_user(1).await.unwrap().len(), 1);
    assert!(ledger.orders_for_user(2).await.unwrap().is_empty());
}

async fn pollable_ordering_excludes_terminal<L: Ledger>(ledger: &L) {
    for number in ["200001", "200002", "200003", "200004", "200005"] {
        ledger.create_order(10, number).await.unwrap();
    }
    ledger
        .apply_accrual_result("200001", OrderStatus::Processing, None)
        .await
        .unwrap();
    ledger
        .apply_accrual_result("200002", OrderStatus::Processing, None)
        .await
        .unwrap();
    ledger
        .apply_accrual_result("200003", OrderStatus::Processed, Some(dec!(50)))
        .await
        .unwrap();
    ledger
        .apply_accrual_result("200004", OrderStatus::Invalid, None)
        .await
        .unwrap();

    // "100001" from the ownership scenario is NEW and never checked too
    let batch = ledger.fetch_pollable(100).await.unwrap();
    let numbers: Vec<&str> = batch.iter().map(|o| o.number.as_str()).collect();
    assert_eq!(numbers, vec!["100001", "200005", "200001", "200002"]);
    assert!(batch.iter().all(|o| !o.status.is_terminal()));

    let limited = ledger.fetch_pollable(2).await.unwrap();
    let numbers: Vec<&str> = limited.iter().map(|o| o.number.as_str()).collect();
    assert_eq!(numbers, vec!["100001", "200005"]);
}

async fn credit_is_at_most_once<L: Ledger>(ledger: &L) {
    // "200003" was processed with 50 above
    assert_eq!(ledger.get_balance(10).await.unwrap().current, dec!(50));

    let replay = ledger
        .apply_accrual_result("200003", OrderStatus::Processed, Some(dec!(50)))
        .await
        .unwrap();
    assert_eq!(replay, ApplyOutcome::Skipped);

    let flip = ledger
        .apply_accrual_result("200004", OrderStatus::Processing, None)
        .await
        .unwrap();
    assert_eq!(flip, ApplyOutcome::Skipped);

    let unknown = ledger
        .apply_accrual_result("999999", OrderStatus::Processing, None)
        .await
        .unwrap();
    assert_eq!(unknown, ApplyOutcome::Skipped);

    assert_eq!(ledger.get_balance(10).await.unwrap().current, dec!(50));
}

async fn rejects_inconsistent_verdicts<L: Ledger>(ledger: &L) {
    assert!(ledger
        .apply_accrual_result("200005", OrderStatus::Processing, Some(dec!(1)))
        .await
        .is_err());
    assert!(ledger
        .apply_accrual_result("200005", OrderStatus::Processed, None)
        .await
        .is_err());

    let untouched = ledger.fetch_pollable(100).await.unwrap();
    assert!(untouched.iter().any(|o| o.number == "200005" && o.updated_at.is_none()));
}

async fn withdrawal_boundary<L: Ledger>(ledger: &L) {
    credit(ledger, 20, "300001", dec!(100)).await;

    let outcome = ledger.withdraw(20, "4561261212345467", dec!(150)).await.unwrap();
    match outcome {
        WithdrawOutcome::InsufficientFunds { available, requested } => {
            assert_eq!(available, dec!(100));
            assert_eq!(requested, dec!(150));
        }
        other => panic!("expected InsufficientFunds, got {:?}", other),
    }
    assert_eq!(ledger.get_balance(20).await.unwrap().current, dec!(100));
    assert!(ledger.withdrawals_for_user(20).await.unwrap().is_empty());

    credit(ledger, 20, "300002", dec!(50)).await;
    let outcome = ledger.withdraw(20, "4561261212345467", dec!(150)).await.unwrap();
    assert!(outcome.is_completed());

    let summary = ledger.get_balance(20).await.unwrap();
    assert_eq!(summary.current, Decimal::ZERO);
    assert_eq!(summary.withdrawn, dec!(150));

    let withdrawals = ledger.withdrawals_for_user(20).await.unwrap();
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].order_number, "4561261212345467");
    assert_eq!(withdrawals[0].sum, dec!(150));

    assert!(ledger.withdraw(20, "4561261212345467", dec!(0)).await.is_err());
    assert!(ledger.withdraw(20, "4561261212345467", dec!(-10)).await.is_err());
}

async fn concurrent_withdrawals<L: Ledger>(ledger: Arc<L>) {
    credit(ledger.as_ref(), 30, "400001", dec!(100)).await;

    let first = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.withdraw(30, "79927398713", dec!(80)).await })
    };
    let second = {
        let ledger = ledger.clone();
        tokio::spawn(async move { ledger.withdraw(30, "79927398713", dec!(80)).await })
    };

    let outcomes = [
        first.await.unwrap().unwrap(),
        second.await.unwrap().unwrap(),
    ];
    let completed = outcomes.iter().filter(|o| o.is_completed()).count();
    let refused = outcomes
        .iter()
        .filter(|o| matches!(o, WithdrawOutcome::InsufficientFunds { .. }))
        .count();
    assert_eq!(completed, 1);
    assert_eq!(refused, 1);

    let summary = ledger.get_balance(30).await.unwrap();
    assert_eq!(summary.current, dec!(20));
    assert_eq!(summary.withdrawn, dec!(80));
}

async fn balance_matches_history<L: Ledger>(ledger: &L) {
    let accruals = [dec!(120.50), dec!(30), dec!(0.25)];
    for (i, amount) in accruals.iter().enumerate() {
        credit(ledger, 40, &format!("50000{}", i), *amount).await;
    }
    ledger.withdraw(40, "12345678903", dec!(100)).await.unwrap();
    ledger.withdraw(40, "12345678903", dec!(50.75)).await.unwrap();
    // exceeds what is left, must not change anything
    ledger.withdraw(40, "12345678903", dec!(1)).await.unwrap();

    let credited: Decimal = ledger
        .orders_for_user(40)
        .await
        .unwrap()
        .iter()
        .filter_map(|o| o.accrual)
        .sum();
    let debited: Decimal = ledger
        .withdrawals_for_user(40)
        .await
        .unwrap()
        .iter()
        .map(|w| w.sum)
        .sum();

    let summary = ledger.get_balance(40).await.unwrap();
    assert_eq!(summary.current, credited - debited);
    assert_eq!(summary.current, Decimal::ZERO);
    assert_eq!(summary.withdrawn, debited);
}

async fn empty_balances<L: Ledger>(ledger: &L) {
    ledger.open_balance(50).await.unwrap();
    ledger.open_balance(50).await.unwrap();
    assert_eq!(ledger.get_balance(50).await.unwrap(), BalanceSummary::empty());

    // no balance row at all
    assert_eq!(ledger.get_balance(60).await.unwrap(), BalanceSummary::empty());
    let outcome = ledger.withdraw(60, "12345678903", dec!(1)).await.unwrap();
    assert!(matches!(
        outcome,
        WithdrawOutcome::InsufficientFunds { available, .. } if available == Decimal::ZERO
    ));
}
