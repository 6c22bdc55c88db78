//! Shared error model of injected wallet providers
//!
//! Browser-style wallets answer requests with `{code, message}` errors using
//! the EIP-1193 / EIP-1474 code space. Both the EVM and the Solana adapters
//! translate these into [`WalletError`].

use std::fmt;

use crate::ports::WalletError;

/// User rejected the request
pub const CODE_USER_REJECTED: i64 = 4001;
/// Requested method or account is not authorized
pub const CODE_UNAUTHORIZED: i64 = 4100;
/// Provider does not support the method
pub const CODE_UNSUPPORTED_METHOD: i64 = 4200;
/// Provider is disconnected from all chains
pub const CODE_DISCONNECTED: i64 = 4900;
/// Chain has not been added to the wallet
pub const CODE_UNRECOGNIZED_CHAIN: i64 = 4902;

/// Raw error object returned by an injected provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

impl std::error::Error for RpcError {}

/// Translate a provider error code into the adapter error.
///
/// `requested_chain` is the chain a switch was asked for, used to tag the
/// unknown-chain case.
pub fn map_rpc_error(err: RpcError, requested_chain: Option<u64>) -> WalletError {
    match err.code {
        CODE_USER_REJECTED => WalletError::UserRejected,
        CODE_UNAUTHORIZED => WalletError::NoAccounts,
        CODE_UNSUPPORTED_METHOD => WalletError::NotSupported(err.message),
        CODE_DISCONNECTED => WalletError::ProviderUnavailable(err.message),
        CODE_UNRECOGNIZED_CHAIN => match requested_chain {
            Some(chain_id) => WalletError::ChainUnknownToWallet(chain_id),
            None => WalletError::Provider {
                code: err.code,
                message: err.message,
            },
        },
        code => WalletError::Provider {
            code,
            message: err.message,
        },
    }
}
