// Accrual reconciliation: status client, worker pool and polling loop
pub mod client;
pub mod dispatcher;
pub mod scheduler;

pub use client::AccrualClient;
pub use dispatcher::Dispatcher;
pub use scheduler::PollingScheduler;
