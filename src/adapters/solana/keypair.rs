use std::fs;
use std::path::Path;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use solana_sdk::{
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use thiserror::Error;

use super::provider::SolanaProvider;
use crate::adapters::injected::{RpcError, CODE_UNSUPPORTED_METHOD};

#[derive(Debug, Error)]
pub enum KeypairError {
    #[error("Failed to load keypair from file: {0}")]
    LoadError(String),
    #[error("Invalid keypair bytes: {0}")]
    InvalidKeypair(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Local keypair acting as a Solana wallet, for terminals and tests
pub struct KeypairProvider {
    keypair: Keypair,
}

impl KeypairProvider {
    /// Load keypair from a file path (JSON array format)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, KeypairError> {
        let contents = fs::read_to_string(path.as_ref())?;

        let bytes: Vec<u8> = serde_json::from_str(&contents)
            .map_err(|e| KeypairError::LoadError(format!("Invalid JSON format: {}", e)))?;

        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeypairError> {
        let keypair =
            Keypair::try_from(bytes).map_err(|e| KeypairError::InvalidKeypair(e.to_string()))?;

        Ok(Self { keypair })
    }

    pub fn new_random() -> Self {
        Self {
            keypair: Keypair::new(),
        }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.keypair.to_bytes().to_vec()
    }
}

#[async_trait]
impl SolanaProvider for KeypairProvider {
    async fn connect(&self) -> Result<String, RpcError> {
        Ok(self.keypair.pubkey().to_string())
    }

    async fn disconnect(&self) -> Result<(), RpcError> {
        Ok(())
    }

    async fn sign_message(&self, message: &[u8]) -> Result<String, RpcError> {
        Ok(self.keypair.sign_message(message).to_string())
    }

    async fn get_balance(&self) -> Result<u64, RpcError> {
        Err(RpcError::new(
            CODE_UNSUPPORTED_METHOD,
            "a local keypair has no cluster connection",
        ))
    }

    fn account_changes(&self) -> BoxStream<'static, Option<String>> {
        // A local key never changes account
        stream::pending().boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_from_bytes() {
        let first = KeypairProvider::new_random();
        let second = KeypairProvider::from_bytes(&first.to_bytes()).unwrap();
        assert_eq!(first.pubkey(), second.pubkey());
    }

    #[test]
    fn test_invalid_bytes() {
        assert!(KeypairProvider::from_bytes(&[0u8; 10]).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        let original = KeypairProvider::new_random();
        let json = serde_json::to_string(&original.to_bytes()).unwrap();
        temp_file.write_all(json.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let loaded = KeypairProvider::from_file(temp_file.path()).unwrap();
        assert_eq!(original.pubkey(), loaded.pubkey());
    }

    #[test]
    fn test_invalid_json_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"not valid json").unwrap();
        temp_file.flush().unwrap();

        assert!(matches!(
            KeypairProvider::from_file(temp_file.path()),
            Err(KeypairError::LoadError(_))
        ));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = KeypairProvider::from_file(dir.path().join("absent.json"));
        assert!(matches!(result, Err(KeypairError::IoError(_))));
    }

    #[tokio::test]
    async fn test_signature_is_base58() {
        let provider = KeypairProvider::new_random();
        let signature = provider.sign_message(b"Hello, Solana!").await.unwrap();
        let raw = bs58::decode(&signature).into_vec().unwrap();
        assert_eq!(raw.len(), 64);
    }
}
