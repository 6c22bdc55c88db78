//! Solana wallet adapter
//!
//! Public-key connect model: connecting yields a base58 public key and the
//! chain is always Solana. Chain switching does not exist here.

pub mod keypair;
pub mod provider;
pub mod wallet;

pub use keypair::{KeypairError, KeypairProvider};
pub use provider::SolanaProvider;
pub use wallet::SolanaWallet;
