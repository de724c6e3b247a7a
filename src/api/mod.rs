pub mod handler;
pub mod identity;
pub mod models;
