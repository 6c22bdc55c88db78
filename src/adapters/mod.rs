//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - EVM: injected request-provider wallets (EIP-1193 style)
//! - Solana: public-key wallets, including a local keypair provider
//! - Demo: in-memory wallet for trying the client without a real wallet
//! - HTTP: swap backend API client
//! - Realtime: WebSocket push transport
//! - CLI: Command-line interface handlers

pub mod cli;
pub mod demo;
pub mod evm;
pub mod http;
pub mod injected;
pub mod realtime;
pub mod solana;

pub use cli::CliApp;
pub use demo::{DemoWallet, DEMO_ADDRESS};
pub use evm::{Eip1193Provider, EvmWallet, ProviderEvent};
pub use http::{ApiClientConfig, SyncApiClient};
pub use injected::{map_rpc_error, RpcError};
pub use realtime::{ws_url_from_http, WsTransport, DEFAULT_WS_PATH};
pub use solana::{KeypairProvider, SolanaProvider, SolanaWallet};
