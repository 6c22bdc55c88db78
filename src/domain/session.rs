use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::chain::ChainId;

/// Which family of wallet backs a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Evm,
    Solana,
    Demo,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Evm => write!(f, "evm"),
            ProviderKind::Solana => write!(f, "solana"),
            ProviderKind::Demo => write!(f, "demo"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "evm" | "metamask" | "coinbase" => Ok(ProviderKind::Evm),
            "solana" | "phantom" => Ok(ProviderKind::Solana),
            "demo" => Ok(ProviderKind::Demo),
            other => Err(format!("unknown wallet provider: {}", other)),
        }
    }
}

/// Lifecycle of the wallet session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl SessionStatus {
    /// Whether `self -> next` is an edge of the session state machine.
    ///
    /// `disconnected -> connecting -> connected -> disconnected`, a failed
    /// connect falls back `connecting -> disconnected`, and a provider fault
    /// goes `connected -> error -> disconnected`.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
                | (Connected, Error)
                | (Error, Disconnected)
        )
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionStatus::Disconnected => "disconnected",
            SessionStatus::Connecting => "connecting",
            SessionStatus::Connected => "connected",
            SessionStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// The live binding to one connected wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub provider_kind: ProviderKind,
    pub address: String,
    pub chain_id: ChainId,
    pub status: SessionStatus,
}

/// Read-only view of the session handed to consumers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session: Option<Session>,
}

impl SessionSnapshot {
    pub fn disconnected() -> Self {
        Self {
            status: SessionStatus::Disconnected,
            session: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected && self.session.is_some()
    }

    pub fn address(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.address.as_str())
    }

    pub fn chain_id(&self) -> Option<ChainId> {
        self.session.as_ref().map(|s| s.chain_id)
    }

    pub fn provider_kind(&self) -> Option<ProviderKind> {
        self.session.as_ref().map(|s| s.provider_kind)
    }
}
