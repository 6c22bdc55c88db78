use std::sync::Arc;

use async_trait::async_trait;
use futures_util::{future, StreamExt};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::provider::{Eip1193Provider, ProviderEvent};
use crate::adapters::injected::map_rpc_error;
use crate::domain::{ChainDescriptor, ChainId, ProviderKind};
use crate::ports::{
    NotificationStream, ProviderNotification, WalletConnection, WalletError, WalletProvider,
};

const WEI_DECIMALS: u32 = 18;

/// EVM wallet speaking EIP-1193 JSON-RPC
#[derive(Clone)]
pub struct EvmWallet {
    provider: Arc<dyn Eip1193Provider>,
    name: String,
}

impl EvmWallet {
    pub fn new(provider: Arc<dyn Eip1193Provider>, name: &str) -> Self {
        Self {
            provider,
            name: name.to_string(),
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, WalletError> {
        debug!(wallet = %self.name, method, "EVM provider request");
        self.provider
            .request(method, params)
            .await
            .map_err(|e| map_rpc_error(e, None))
    }

    async fn accounts(&self, method: &str) -> Result<Vec<String>, WalletError> {
        let value = self.call(method, json!([])).await?;
        parse_accounts(&value)
    }

    async fn first_account(&self, method: &str) -> Result<String, WalletError> {
        self.accounts(method)
            .await?
            .into_iter()
            .next()
            .ok_or(WalletError::NoAccounts)
    }
}

fn parse_accounts(value: &Value) -> Result<Vec<String>, WalletError> {
    let list = value.as_array().ok_or_else(|| WalletError::Provider {
        code: -32603,
        message: format!("expected account list, got {}", value),
    })?;
    Ok(list
        .iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect())
}

fn parse_chain_id(value: &Value) -> Result<ChainId, WalletError> {
    value
        .as_str()
        .and_then(ChainId::from_hex)
        .ok_or_else(|| WalletError::Provider {
            code: -32603,
            message: format!("invalid chain id {}", value),
        })
}

/// Hex wei quantity to whole native units
fn parse_wei(value: &Value) -> Result<Decimal, WalletError> {
    let invalid = || WalletError::Provider {
        code: -32603,
        message: format!("invalid balance {}", value),
    };
    let digits = value
        .as_str()
        .and_then(|hex| hex.strip_prefix("0x"))
        .ok_or_else(invalid)?;
    let wei = u128::from_str_radix(digits, 16)
        .ok()
        .and_then(|wei| i128::try_from(wei).ok())
        .ok_or_else(invalid)?;
    Decimal::try_from_i128_with_scale(wei, WEI_DECIMALS)
        .map(|balance| balance.normalize())
        .map_err(|_| invalid())
}

#[async_trait]
impl WalletProvider for EvmWallet {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Evm
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<WalletConnection, WalletError> {
        let address = self.first_account("eth_requestAccounts").await?;
        let chain_id = self.get_chain_id().await?;
        Ok(WalletConnection { address, chain_id })
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        // EIP-1193 has no revoke call; access persists in the extension
        Ok(())
    }

    async fn get_address(&self) -> Result<String, WalletError> {
        self.first_account("eth_accounts").await
    }

    async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
        let value = self.call("eth_chainId", json!([])).await?;
        parse_chain_id(&value)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        let hex_id = format!("0x{:x}", chain_id);
        self.provider
            .request("wallet_switchEthereumChain", json!([{ "chainId": hex_id }]))
            .await
            .map(|_| ())
            .map_err(|e| map_rpc_error(e, Some(chain_id)))
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), WalletError> {
        let params = json!([{
            "chainId": format!("0x{:x}", chain.chain_id),
            "chainName": chain.name,
            "nativeCurrency": {
                "name": chain.native_currency_symbol,
                "symbol": chain.native_currency_symbol,
                "decimals": chain.native_decimals,
            },
            "rpcUrls": [chain.rpc_endpoint],
        }]);
        match self.provider.request("wallet_addEthereumChain", params).await {
            Ok(_) => Ok(()),
            Err(e) => Err(match map_rpc_error(e, None) {
                WalletError::Provider { message, .. } => WalletError::UnsupportedChain(message),
                other => other,
            }),
        }
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        let address = self.get_address().await?;
        let payload = format!("0x{}", hex::encode(message));
        let value = self
            .call("personal_sign", json!([payload, address]))
            .await?;
        let signature = value.as_str().ok_or_else(|| WalletError::Provider {
            code: -32603,
            message: format!("expected hex signature, got {}", value),
        })?;
        hex::decode(signature.trim_start_matches("0x")).map_err(|e| WalletError::Provider {
            code: -32603,
            message: format!("invalid signature encoding: {}", e),
        })
    }

    async fn get_balance(&self) -> Result<Decimal, WalletError> {
        let address = self.get_address().await?;
        let value = self
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        parse_wei(&value)
    }

    fn notifications(&self) -> NotificationStream {
        self.provider
            .events()
            .take_while(|event| future::ready(*event != ProviderEvent::Disconnect))
            .filter_map(|event| {
                future::ready(match event {
                    ProviderEvent::AccountsChanged(accounts) => {
                        Some(ProviderNotification::AccountsChanged(accounts))
                    }
                    ProviderEvent::ChainChanged(hex_id) => match ChainId::from_hex(&hex_id) {
                        Some(chain_id) => Some(ProviderNotification::ChainChanged(chain_id)),
                        None => {
                            warn!(chain = %hex_id, "Ignoring chainChanged with invalid id");
                            None
                        }
                    },
                    ProviderEvent::Disconnect => None,
                })
            })
            .boxed()
    }
}
