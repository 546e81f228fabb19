//! Redpanda work queue for items collected by remote schedulers.

pub mod config;
pub mod consumer;
pub mod health;

pub use config::*;
pub use consumer::{decode_record, RedpandaQueue};
pub use health::{check_connection, missing_queues};
