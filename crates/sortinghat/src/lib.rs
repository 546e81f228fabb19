//! SortingHat identity registry client.

pub mod client;
pub mod config;

pub use client::SortingHatClient;
pub use config::SortingHatConfig;
