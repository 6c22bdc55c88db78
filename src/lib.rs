//! sync-client - Wallet sessions and cross-chain swap tracking
//!
//! Client core for the SYNC cross-chain swap backend: connects a wallet,
//! keeps quotes consistent with the latest inputs, submits swaps and follows
//! their progress over a realtime push channel.
//!
//! # Modules
//!
//! - `domain`: Core types (ChainId, ChainRegistry, Session, Quote, SwapTicket)
//! - `ports`: Trait abstractions (WalletProvider, SwapApiPort, RealtimeTransport)
//! - `adapters`: External implementations (EVM, Solana, Demo, HTTP, WebSocket, CLI)
//! - `config`: Configuration loading and validation
//! - `application`: Session manager, quote orchestrator, swap executor, realtime channel

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
