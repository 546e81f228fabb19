//! ClickHouse document store for raw and enriched indexes.

pub mod client;
pub mod config;
pub mod health;
pub mod insert;
pub mod query;
pub mod schema;
pub mod store;

pub use client::ClickHouseClient;
pub use config::*;
pub use health::{check_connection, init_database};
pub use store::ClickHouseStore;
