//! Configuration Loader
//!
//! Loads and validates configuration from TOML files matching config.toml structure.
//! Every section is optional; missing keys fall back to the client defaults.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::adapters::http::ApiClientConfig;
use crate::adapters::realtime::{ws_url_from_http, DEFAULT_WS_PATH};
use crate::application::{ChannelSettings, QuoteSettings};
use crate::domain::ProviderKind;

/// Environment variable overriding `[api] base_url`
pub const API_URL_ENV: &str = "SYNC_API_URL";

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiSection,
    pub realtime: RealtimeSection,
    pub quotes: QuotesSection,
    pub wallet: WalletSection,
    pub logging: LoggingSection,
}

/// Backend HTTP API section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    /// Backend origin, without the `/api` prefix
    pub base_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ApiSection {
    /// Get base URL with environment variable override
    /// Checks SYNC_API_URL env var first, falls back to config value
    pub fn get_base_url(&self) -> String {
        std::env::var(API_URL_ENV).unwrap_or_else(|_| self.base_url.clone())
    }

    pub fn client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            base_url: self.get_base_url(),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

/// Push channel section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RealtimeSection {
    /// Socket path on the API origin
    pub ws_path: String,
    /// Fixed delay between reconnect attempts
    pub reconnect_delay_secs: u64,
    /// Number of most recent events kept in the channel state
    pub history_capacity: usize,
}

impl Default for RealtimeSection {
    fn default() -> Self {
        Self {
            ws_path: DEFAULT_WS_PATH.to_string(),
            reconnect_delay_secs: 5,
            history_capacity: 10,
        }
    }
}

impl RealtimeSection {
    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
            history_capacity: self.history_capacity,
        }
    }
}

/// Quote section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuotesSection {
    /// Slippage tolerance in percent sent with every quote and swap
    pub slippage_pct: f64,
    /// Lifetime applied when the backend reports no expiry
    pub fallback_ttl_secs: u64,
}

impl Default for QuotesSection {
    fn default() -> Self {
        Self {
            slippage_pct: 0.5,
            fallback_ttl_secs: 30,
        }
    }
}

impl QuotesSection {
    pub fn quote_settings(&self) -> QuoteSettings {
        QuoteSettings {
            slippage_pct: self.slippage_pct,
            fallback_ttl: Duration::from_secs(self.fallback_ttl_secs),
        }
    }
}

/// Wallet section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WalletSection {
    /// Provider used by the CLI: "evm", "solana" or "demo"
    pub default_provider: String,
    /// Optional keypair file backing the Solana wallet
    pub keypair_path: Option<String>,
}

impl Default for WalletSection {
    fn default() -> Self {
        Self {
            default_provider: "demo".to_string(),
            keypair_path: None,
        }
    }
}

impl WalletSection {
    pub fn provider_kind(&self) -> Result<ProviderKind, ConfigError> {
        self.default_provider
            .parse()
            .map_err(ConfigError::ValidationError)
    }

    /// Keypair path with `~` expanded
    pub fn expanded_keypair_path(&self) -> Option<String> {
        self.keypair_path
            .as_deref()
            .map(|path| shellexpand::tilde(path).to_string())
    }
}

/// Logging configuration section
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: Option<String>,
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = self.api.get_base_url();
        if base_url.is_empty() {
            return Err(ConfigError::ValidationError(
                "base_url cannot be empty".to_string(),
            ));
        }

        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::ValidationError(format!(
                "base_url must use http or https, got {}",
                base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_secs must be > 0".to_string(),
            ));
        }

        if self.realtime.reconnect_delay_secs == 0 {
            return Err(ConfigError::ValidationError(
                "reconnect_delay_secs must be > 0".to_string(),
            ));
        }

        if self.realtime.history_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "history_capacity must be > 0".to_string(),
            ));
        }

        if !self.realtime.ws_path.starts_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "ws_path must start with '/', got {}",
                self.realtime.ws_path
            )));
        }

        if self.quotes.slippage_pct <= 0.0 || self.quotes.slippage_pct > 50.0 {
            return Err(ConfigError::ValidationError(format!(
                "slippage_pct must be in (0, 50], got {}",
                self.quotes.slippage_pct
            )));
        }

        if self.quotes.fallback_ttl_secs == 0 {
            return Err(ConfigError::ValidationError(
                "fallback_ttl_secs must be > 0".to_string(),
            ));
        }

        self.wallet.provider_kind()?;

        Ok(())
    }

    /// Socket URL derived from the API origin
    pub fn ws_url(&self) -> Result<String, ConfigError> {
        let base_url = self.api.get_base_url();
        ws_url_from_http(&base_url, &self.realtime.ws_path).ok_or_else(|| {
            ConfigError::ValidationError(format!("cannot derive socket URL from {}", base_url))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[api]
base_url = "http://localhost:8001"
timeout_secs = 10

[realtime]
ws_path = "/api/ws"
reconnect_delay_secs = 5
history_capacity = 10

[quotes]
slippage_pct = 1.0
fallback_ttl_secs = 30

[wallet]
default_provider = "solana"
keypair_path = "~/.config/solana/id.json"

[logging]
level = "info"
"#
        .to_string()
    }

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_config(&create_valid_config());

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.realtime.history_capacity, 10);
        assert_eq!(config.quotes.slippage_pct, 1.0);
        assert_eq!(config.wallet.provider_kind().unwrap(), ProviderKind::Solana);
        assert_eq!(config.logging.level.as_deref(), Some("info"));
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let file = write_config("");

        let config = load_config(file.path()).unwrap();

        assert_eq!(config.api.base_url, "http://localhost:8001");
        assert_eq!(config.api.timeout_secs, 30);
        assert_eq!(config.realtime.ws_path, "/api/ws");
        assert_eq!(config.realtime.reconnect_delay_secs, 5);
        assert_eq!(config.realtime.history_capacity, 10);
        assert_eq!(config.quotes.slippage_pct, 0.5);
        assert_eq!(config.quotes.fallback_ttl_secs, 30);
        assert_eq!(config.wallet.provider_kind().unwrap(), ProviderKind::Demo);
        assert!(config.logging.level.is_none());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(result.is_err());
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let file = write_config("[api\nbase_url = ");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ParseError(_)
        ));
    }

    #[test]
    fn test_invalid_slippage() {
        for slippage in ["0.0", "-1.0", "50.5"] {
            let file = write_config(&format!("[quotes]\nslippage_pct = {}\n", slippage));
            let err = load_config(file.path()).unwrap_err();
            assert!(
                matches!(err, ConfigError::ValidationError(ref msg) if msg.contains("slippage_pct")),
                "slippage {} should be rejected",
                slippage
            );
        }
    }

    #[test]
    fn test_zero_reconnect_delay() {
        let file = write_config("[realtime]\nreconnect_delay_secs = 0\n");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_zero_history_capacity() {
        let file = write_config("[realtime]\nhistory_capacity = 0\n");
        assert!(matches!(
            load_config(file.path()).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn test_unknown_provider() {
        let file = write_config("[wallet]\ndefault_provider = \"ledger\"\n");
        let err = load_config(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref msg) if msg.contains("ledger")));
    }

    #[test]
    fn test_section_conversions() {
        let config = Config::default();

        let quotes = config.quotes.quote_settings();
        assert_eq!(quotes.fallback_ttl, Duration::from_secs(30));

        let channel = config.realtime.channel_settings();
        assert_eq!(channel.reconnect_delay, Duration::from_secs(5));
        assert_eq!(channel.history_capacity, 10);
    }

    #[test]
    fn test_keypair_path_expansion() {
        let file = write_config(&create_valid_config());
        let config = load_config(file.path()).unwrap();

        let expanded = config.wallet.expanded_keypair_path().unwrap();
        assert!(!expanded.starts_with('~'));
        assert!(expanded.ends_with(".config/solana/id.json"));
    }
}
