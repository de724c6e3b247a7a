// Ledger: orders, balances and withdrawals
pub mod models;
pub mod repository;
pub mod store;

#[cfg(test)]
pub mod contract;

pub use repository::LedgerRepository;
pub use store::{BalanceStore, OrderStore, WithdrawalStore};
