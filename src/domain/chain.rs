//! Chain identifiers and the read-only chain registry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Chain a session is bound to.
///
/// EVM wallets report numeric ids; the Solana and demo wallets report a
/// fixed symbolic chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Evm(u64),
    Solana,
    Demo,
}

impl ChainId {
    /// Numeric id for EVM chains
    pub fn evm_id(&self) -> Option<u64> {
        match self {
            ChainId::Evm(id) => Some(*id),
            _ => None,
        }
    }

    /// Parse a `0x`-prefixed hex chain id as reported by injected EVM providers
    pub fn from_hex(hex_id: &str) -> Option<Self> {
        let digits = hex_id
            .strip_prefix("0x")
            .or_else(|| hex_id.strip_prefix("0X"))?;
        u64::from_str_radix(digits, 16).ok().map(ChainId::Evm)
    }

    /// Hex encoding used by `wallet_switchEthereumChain` / `wallet_addEthereumChain`
    pub fn to_hex(&self) -> Option<String> {
        self.evm_id().map(|id| format!("0x{:x}", id))
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainId::Evm(id) => write!(f, "{}", id),
            ChainId::Solana => write!(f, "solana"),
            ChainId::Demo => write!(f, "demo"),
        }
    }
}

/// Static reference data for an EVM chain a wallet can be asked to add
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_endpoint: String,
    pub native_currency_symbol: String,
    pub native_decimals: u8,
}

impl ChainDescriptor {
    pub fn new(chain_id: u64, name: &str, rpc_endpoint: &str, symbol: &str) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            rpc_endpoint: rpc_endpoint.to_string(),
            native_currency_symbol: symbol.to_string(),
            native_decimals: 18,
        }
    }
}

/// Chain entry as served by `GET /api/chains`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteChain {
    pub id: String,
    pub name: String,
    pub currency_symbol: String,
    /// Numeric EVM id, absent for non-EVM chains
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(default)]
    pub rpc_url: Option<String>,
}

/// Immutable lookup table of known chains, shared read-only between sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainRegistry {
    chains: BTreeMap<u64, ChainDescriptor>,
}

impl ChainRegistry {
    pub fn empty() -> Self {
        Self {
            chains: BTreeMap::new(),
        }
    }

    /// Registry seeded with the EVM chains the wallet layer can add
    pub fn builtin() -> Self {
        let chains = [
            ChainDescriptor::new(1, "Ethereum", "https://mainnet.infura.io/v3/", "ETH"),
            ChainDescriptor::new(137, "Polygon", "https://polygon-rpc.com/", "MATIC"),
            ChainDescriptor::new(42161, "Arbitrum", "https://arb1.arbitrum.io/rpc", "ETH"),
            ChainDescriptor::new(10, "Optimism", "https://mainnet.optimism.io", "ETH"),
            ChainDescriptor::new(56, "BSC", "https://bsc-dataseed.binance.org/", "BNB"),
            ChainDescriptor::new(250, "Fantom", "https://rpc.ftm.tools/", "FTM"),
            ChainDescriptor::new(43114, "Avalanche", "https://api.avax.network/ext/bc/C/rpc", "AVAX"),
        ];
        Self::from_descriptors(chains)
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ChainDescriptor>) -> Self {
        Self {
            chains: descriptors.into_iter().map(|d| (d.chain_id, d)).collect(),
        }
    }

    pub fn get(&self, chain_id: u64) -> Option<&ChainDescriptor> {
        self.chains.get(&chain_id)
    }

    pub fn contains(&self, chain_id: u64) -> bool {
        self.chains.contains_key(&chain_id)
    }

    pub fn len(&self) -> usize {
        self.chains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChainDescriptor> {
        self.chains.values()
    }

    /// New registry with backend chain entries layered over this one.
    ///
    /// Entries without a numeric chain id are skipped. A remote entry without
    /// an RPC URL keeps the local endpoint when one is known.
    pub fn merged_with(&self, remote: &[RemoteChain]) -> Self {
        let mut chains = self.chains.clone();
        for entry in remote {
            let Some(chain_id) = entry.chain_id else {
                continue;
            };
            let rpc_endpoint = entry
                .rpc_url
                .clone()
                .or_else(|| chains.get(&chain_id).map(|c| c.rpc_endpoint.clone()))
                .unwrap_or_default();
            let native_decimals = chains.get(&chain_id).map(|c| c.native_decimals).unwrap_or(18);
            chains.insert(
                chain_id,
                ChainDescriptor {
                    chain_id,
                    name: entry.name.clone(),
                    rpc_endpoint,
                    native_currency_symbol: entry.currency_symbol.clone(),
                    native_decimals,
                },
            );
        }
        Self { chains }
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_round_trip() {
        assert_eq!(ChainId::from_hex("0x89"), Some(ChainId::Evm(137)));
        assert_eq!(ChainId::Evm(137).to_hex().as_deref(), Some("0x89"));
        assert_eq!(ChainId::from_hex("89"), None);
        assert_eq!(ChainId::from_hex("0xzz"), None);
        assert_eq!(ChainId::Solana.to_hex(), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(ChainId::Evm(1).to_string(), "1");
        assert_eq!(ChainId::Demo.to_string(), "demo");
        assert_eq!(ChainId::Solana.to_string(), "solana");
    }

    #[test]
    fn test_builtin_registry() {
        let registry = ChainRegistry::builtin();
        assert_eq!(registry.len(), 7);

        let polygon = registry.get(137).unwrap();
        assert_eq!(polygon.name, "Polygon");
        assert_eq!(polygon.native_currency_symbol, "MATIC");
        assert_eq!(polygon.native_decimals, 18);
        assert!(registry.get(999).is_none());
    }

    #[test]
    fn test_merge_remote_chains() {
        let registry = ChainRegistry::builtin();
        let remote = vec![
            RemoteChain {
                id: "polygon".to_string(),
                name: "Polygon PoS".to_string(),
                currency_symbol: "POL".to_string(),
                chain_id: Some(137),
                rpc_url: None,
            },
            RemoteChain {
                id: "base".to_string(),
                name: "Base".to_string(),
                currency_symbol: "ETH".to_string(),
                chain_id: Some(8453),
                rpc_url: Some("https://mainnet.base.org".to_string()),
            },
            RemoteChain {
                id: "solana".to_string(),
                name: "Solana".to_string(),
                currency_symbol: "SOL".to_string(),
                chain_id: None,
                rpc_url: None,
            },
        ];

        let merged = registry.merged_with(&remote);
        assert_eq!(merged.len(), 8);
        assert_eq!(merged.get(137).unwrap().name, "Polygon PoS");
        assert_eq!(merged.get(137).unwrap().rpc_endpoint, "https://polygon-rpc.com/");
        assert_eq!(merged.get(8453).unwrap().rpc_endpoint, "https://mainnet.base.org");

        // Source registry untouched
        assert_eq!(registry.get(137).unwrap().name, "Polygon");
    }
}
