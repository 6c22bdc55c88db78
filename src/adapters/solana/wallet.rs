use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use super::provider::SolanaProvider;
use crate::adapters::injected::map_rpc_error;
use crate::domain::{ChainDescriptor, ChainId, ProviderKind};
use crate::ports::{
    NotificationStream, ProviderNotification, WalletConnection, WalletError, WalletProvider,
};

const LAMPORT_DECIMALS: u32 = 9;

/// Solana wallet with a fixed chain and a base58 public-key account
pub struct SolanaWallet {
    provider: Arc<dyn SolanaProvider>,
    name: String,
    public_key: Mutex<Option<Pubkey>>,
}

impl SolanaWallet {
    pub fn new(provider: Arc<dyn SolanaProvider>, name: &str) -> Self {
        Self {
            provider,
            name: name.to_string(),
            public_key: Mutex::new(None),
        }
    }
}

fn parse_public_key(raw: &str) -> Result<Pubkey, WalletError> {
    Pubkey::from_str(raw).map_err(|e| WalletError::Provider {
        code: -32603,
        message: format!("invalid public key {}: {}", raw, e),
    })
}

#[async_trait]
impl WalletProvider for SolanaWallet {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Solana
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<WalletConnection, WalletError> {
        let raw = self
            .provider
            .connect()
            .await
            .map_err(|e| map_rpc_error(e, None))?;
        let public_key = parse_public_key(&raw)?;
        *self.public_key.lock() = Some(public_key);
        debug!(wallet = %self.name, %public_key, "Solana wallet connected");

        Ok(WalletConnection {
            address: public_key.to_string(),
            chain_id: ChainId::Solana,
        })
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        *self.public_key.lock() = None;
        self.provider
            .disconnect()
            .await
            .map_err(|e| map_rpc_error(e, None))
    }

    async fn get_address(&self) -> Result<String, WalletError> {
        self.public_key
            .lock()
            .map(|pk| pk.to_string())
            .ok_or(WalletError::NoAccounts)
    }

    async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
        Ok(ChainId::Solana)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        Err(WalletError::NotSupported(format!(
            "Solana wallets cannot switch to chain {}",
            chain_id
        )))
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), WalletError> {
        Err(WalletError::NotSupported(format!(
            "Solana wallets cannot add chain {}",
            chain.chain_id
        )))
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        let encoded = self
            .provider
            .sign_message(message)
            .await
            .map_err(|e| map_rpc_error(e, None))?;
        bs58::decode(&encoded)
            .into_vec()
            .map_err(|e| WalletError::Provider {
                code: -32603,
                message: format!("invalid signature encoding: {}", e),
            })
    }

    async fn get_balance(&self) -> Result<Decimal, WalletError> {
        let lamports = self
            .provider
            .get_balance()
            .await
            .map_err(|e| map_rpc_error(e, None))?;
        Ok(Decimal::from_i128_with_scale(i128::from(lamports), LAMPORT_DECIMALS).normalize())
    }

    fn notifications(&self) -> NotificationStream {
        self.provider
            .account_changes()
            .filter_map(|change| {
                future::ready(match change {
                    Some(raw) => match parse_public_key(&raw) {
                        Ok(pk) => Some(ProviderNotification::AccountsChanged(vec![pk.to_string()])),
                        Err(e) => {
                            tracing::warn!(error = %e, "Ignoring account change");
                            None
                        }
                    },
                    None => Some(ProviderNotification::AccountsChanged(Vec::new())),
                })
            })
            .boxed()
    }
}
