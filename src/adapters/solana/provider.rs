use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::adapters::injected::RpcError;

/// Injected Solana wallet surface (Phantom style)
#[async_trait]
pub trait SolanaProvider: Send + Sync {
    /// Request access; returns the base58 public key
    async fn connect(&self) -> Result<String, RpcError>;

    async fn disconnect(&self) -> Result<(), RpcError>;

    /// Sign arbitrary bytes; returns a base58 signature
    async fn sign_message(&self, message: &[u8]) -> Result<String, RpcError>;

    /// Balance of the connected account in lamports
    async fn get_balance(&self) -> Result<u64, RpcError>;

    /// Account switches. `None` means the wallet revoked access.
    fn account_changes(&self) -> BoxStream<'static, Option<String>>;
}
