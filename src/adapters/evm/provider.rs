use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde_json::Value;

use crate::adapters::injected::RpcError;

/// Raw event emitted by an EIP-1193 provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    AccountsChanged(Vec<String>),
    /// Hex encoded chain id as reported by the provider
    ChainChanged(String),
    /// Provider lost its connection to every chain
    Disconnect,
}

/// Minimal EIP-1193 surface: a JSON-RPC `request` plus an event feed
#[async_trait]
pub trait Eip1193Provider: Send + Sync {
    async fn request(&self, method: &str, params: Value) -> Result<Value, RpcError>;

    /// Ordered event feed; ends when the provider goes away
    fn events(&self) -> BoxStream<'static, ProviderEvent>;
}
