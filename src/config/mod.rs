//! Configuration Module
//!
//! Loads and validates configuration from TOML files.

pub mod loader;

pub use loader::{
    load_config, ApiSection, Config, ConfigError, LoggingSection, QuotesSection,
    RealtimeSection, WalletSection, API_URL_ENV,
};
