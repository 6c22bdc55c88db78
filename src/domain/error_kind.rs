use serde::{Deserialize, Serialize};
use std::fmt;

/// Error taxonomy shared by every boundary error type.
///
/// Adapter, manager and API errors carry richer context; `kind()` on each of
/// them collapses to one of these so callers and listeners can match on a
/// single enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
    ProviderUnavailable,
    UserRejected,
    NoAccounts,
    SessionBusy,
    NotConnected,
    ChainUnknownToWallet,
    UnsupportedChain,
    ChainSwitchFailed,
    NotSupported,
    QuoteUnavailable,
    SwapRejected,
    SwapUnavailable,
    TransportError,
    /// Operation superseded by a disconnect before it completed
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
