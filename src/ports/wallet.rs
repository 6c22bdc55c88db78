//! Wallet provider port
//!
//! Uniform capability surface over a concrete wallet's native API. The session
//! manager depends only on this trait; EVM, Solana and demo wallets are
//! interchangeable behind it.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::domain::{ChainDescriptor, ChainId, ErrorKind, ProviderKind};

/// Errors surfaced by a wallet adapter
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WalletError {
    /// Extension/app not present or stopped responding
    #[error("Wallet provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// User explicitly declined the request
    #[error("Request rejected by user")]
    UserRejected,

    /// Wallet is locked or exposes no accounts
    #[error("No accounts available")]
    NoAccounts,

    /// Wallet does not know the chain; `add_chain` must be called first
    #[error("Chain {0} is not configured in the wallet")]
    ChainUnknownToWallet(u64),

    /// Wallet refused to add the chain
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(String),

    /// Capability not offered by this wallet family
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Any other provider-level RPC failure
    #[error("Provider error {code}: {message}")]
    Provider { code: i64, message: String },
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::ProviderUnavailable(_) | WalletError::Provider { .. } => {
                ErrorKind::ProviderUnavailable
            }
            WalletError::UserRejected => ErrorKind::UserRejected,
            WalletError::NoAccounts => ErrorKind::NoAccounts,
            WalletError::ChainUnknownToWallet(_) => ErrorKind::ChainUnknownToWallet,
            WalletError::UnsupportedChain(_) => ErrorKind::UnsupportedChain,
            WalletError::NotSupported(_) => ErrorKind::NotSupported,
        }
    }
}

/// Result of a successful `connect`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletConnection {
    pub address: String,
    pub chain_id: ChainId,
}

/// Notification pushed by the wallet outside of any request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderNotification {
    /// New account list; empty means the wallet revoked access
    AccountsChanged(Vec<String>),
    /// Wallet moved to another chain, on its own or after `switch_chain`
    ChainChanged(ChainId),
}

/// Ordered stream of account and chain notifications.
///
/// Both notification kinds share one stream so their relative order is
/// preserved. The stream ending while a session is live is treated as a
/// provider fault.
pub type NotificationStream = BoxStream<'static, ProviderNotification>;

/// Capability contract every wallet adapter implements
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Wallet family
    fn kind(&self) -> ProviderKind;

    /// Human readable wallet name ("MetaMask", "Phantom", "Demo Wallet")
    fn name(&self) -> &str;

    /// Request access and report the active account and chain
    async fn connect(&self) -> Result<WalletConnection, WalletError>;

    /// Release the wallet; best effort
    async fn disconnect(&self) -> Result<(), WalletError>;

    async fn get_address(&self) -> Result<String, WalletError>;

    async fn get_chain_id(&self) -> Result<ChainId, WalletError>;

    /// Ask the wallet to move to `chain_id`
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    /// Register a chain the wallet does not know yet
    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), WalletError>;

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError>;

    /// Native-currency balance of the active account, in whole units
    async fn get_balance(&self) -> Result<Decimal, WalletError>;

    /// Subscribe to account/chain change notifications
    fn notifications(&self) -> NotificationStream;
}
