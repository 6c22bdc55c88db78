//! Swap backend HTTP adapter

pub mod client;

pub use client::{ApiClientConfig, SyncApiClient};
