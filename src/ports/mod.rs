//! Ports Layer - Trait definitions for external dependencies
//!
//! This module defines the interfaces (ports) that adapters must implement.
//! Following hexagonal architecture, these traits abstract:
//! - Wallet providers (EVM extensions, Solana wallets, the demo wallet)
//! - The swap backend (quote, swap, chains, transaction history)
//! - The realtime push socket

pub mod mocks;
pub mod realtime;
pub mod swap_api;
pub mod wallet;

// Re-export main traits and types
pub use realtime::{
    parse_event, MalformedEvent, RealtimeConnection, RealtimeEvent, RealtimeTransport,
    SubscribeMessage, TransportError,
};
pub use swap_api::{
    swap_error_kind, ApiError, QuotePayload, SwapApiPort, SwapRequest, SwapSubmission,
    TransactionRecord, DEFAULT_SLIPPAGE_PCT,
};
pub use wallet::{
    NotificationStream, ProviderNotification, WalletConnection, WalletError, WalletProvider,
};
