//! EVM wallet adapter
//!
//! Wraps an EIP-1193 style request provider (MetaMask, Coinbase Wallet and
//! friends) behind the [`WalletProvider`](crate::ports::WalletProvider) port.

pub mod provider;
pub mod wallet;

pub use provider::{Eip1193Provider, ProviderEvent};
pub use wallet::EvmWallet;
