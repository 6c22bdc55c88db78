//! Swap backend port
//!
//! Request/response contract of the quote, swap, chains and transactions
//! endpoints. The backend itself is a black box.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ErrorKind, RemoteChain, SwapFormState};

/// Default slippage tolerance in percent
pub const DEFAULT_SLIPPAGE_PCT: f64 = 0.5;

/// Errors at the HTTP boundary
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ApiError {
    /// Connection, timeout or other transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Backend refused the request (4xx)
    #[error("Request rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    /// Backend failed (5xx)
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Response body did not match the contract
    #[error("Failed to parse response: {0}")]
    Parse(String),
}

impl ApiError {
    /// Whether the backend explicitly refused, as opposed to being unreachable
    pub fn is_rejection(&self) -> bool {
        matches!(self, ApiError::Rejected { .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Parse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        ApiError::Parse(err.to_string())
    }
}

/// Body shared by `POST /api/quote` and `POST /api/swap`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapRequest {
    pub from_chain: String,
    pub to_chain: String,
    pub from_token: String,
    pub to_token: String,
    pub amount: String,
    /// Slippage tolerance in percent (0.5 = 0.5%)
    pub slippage: f64,
    pub user_address: String,
}

impl SwapRequest {
    pub fn from_form(form: &SwapFormState, slippage: f64, user_address: &str) -> Self {
        Self {
            from_chain: form.from_chain.clone(),
            to_chain: form.to_chain.clone(),
            from_token: form.from_token.clone(),
            to_token: form.to_token.clone(),
            amount: form.amount.trim().to_string(),
            slippage,
            user_address: user_address.to_string(),
        }
    }
}

/// `quote` object of the quote response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotePayload {
    pub to_amount: String,
    /// Estimated execution time in seconds
    pub execution_time: u64,
    /// Price impact in percent
    pub price_impact: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bridge_fees: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Server-supplied validity window in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
}

/// Envelope of `POST /api/quote`
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteEnvelope {
    pub quote: QuotePayload,
}

/// Response of `POST /api/swap`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwapSubmission {
    pub transaction_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Envelope of `GET /api/chains`
#[derive(Debug, Clone, Deserialize)]
pub struct ChainsEnvelope {
    #[serde(default)]
    pub chains: Vec<RemoteChain>,
}

/// Entry of `GET /api/transactions/:address`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: String,
    pub status: String,
    #[serde(default)]
    pub tx_hash: Option<String>,
}

/// Envelope of `GET /api/transactions/:address`
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionsEnvelope {
    #[serde(default)]
    pub transactions: Vec<TransactionRecord>,
}

/// Swap backend contract
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SwapApiPort: Send + Sync {
    /// Fetch an advisory quote
    async fn quote(&self, request: &SwapRequest) -> Result<QuotePayload, ApiError>;

    /// Submit the swap for execution
    async fn swap(&self, request: &SwapRequest) -> Result<SwapSubmission, ApiError>;

    /// Supported chains
    async fn chains(&self) -> Result<Vec<RemoteChain>, ApiError>;

    /// Transaction history for an address, used for reconciliation
    async fn transactions(&self, address: &str) -> Result<Vec<TransactionRecord>, ApiError>;
}

/// Map an API error on the swap path to the taxonomy
pub fn swap_error_kind(err: &ApiError) -> ErrorKind {
    if err.is_rejection() {
        ErrorKind::SwapRejected
    } else {
        ErrorKind::SwapUnavailable
    }
}
