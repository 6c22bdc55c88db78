//! Demo wallet
//!
//! Deterministic in-process wallet for demos and tests. Makes no external
//! calls, always reports `demo_address_123` on the demo chain and signs with
//! an ephemeral ed25519 key.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use solana_sdk::signature::{Keypair, Signer};

use crate::domain::{ChainDescriptor, ChainId, ProviderKind};
use crate::ports::{NotificationStream, WalletConnection, WalletError, WalletProvider};

pub const DEMO_ADDRESS: &str = "demo_address_123";
pub const DEMO_BALANCE: Decimal = dec!(10);

pub struct DemoWallet {
    keypair: Keypair,
}

impl DemoWallet {
    pub fn new() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }
}

impl Default for DemoWallet {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletProvider for DemoWallet {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Demo
    }

    fn name(&self) -> &str {
        "Demo Wallet"
    }

    async fn connect(&self) -> Result<WalletConnection, WalletError> {
        Ok(WalletConnection {
            address: DEMO_ADDRESS.to_string(),
            chain_id: ChainId::Demo,
        })
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        Ok(())
    }

    async fn get_address(&self) -> Result<String, WalletError> {
        Ok(DEMO_ADDRESS.to_string())
    }

    async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
        Ok(ChainId::Demo)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        Err(WalletError::NotSupported(format!(
            "demo wallet cannot switch to chain {}",
            chain_id
        )))
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), WalletError> {
        Err(WalletError::NotSupported(format!(
            "demo wallet cannot add chain {}",
            chain.chain_id
        )))
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        Ok(self.keypair.sign_message(message).as_ref().to_vec())
    }

    async fn get_balance(&self) -> Result<Decimal, WalletError> {
        Ok(DEMO_BALANCE)
    }

    fn notifications(&self) -> NotificationStream {
        // Never changes account or chain, and never goes away
        stream::pending().boxed()
    }
}
