//! Swap backend HTTP client
//!
//! reqwest client for the quote, swap, chains and transactions endpoints.
//! Requests are not retried: a stale quote is worthless and a duplicated swap
//! submission is worse than a failed one.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::domain::RemoteChain;
use crate::ports::swap_api::{ChainsEnvelope, QuoteEnvelope, TransactionsEnvelope};
use crate::ports::{ApiError, QuotePayload, SwapApiPort, SwapRequest, SwapSubmission, TransactionRecord};

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ApiClientConfig {
    /// Backend origin, e.g. `https://api.sync.exchange`
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl Default for ApiClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Error body returned by the backend on failure
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Swap backend client
#[derive(Debug, Clone)]
pub struct SyncApiClient {
    config: ApiClientConfig,
    http: Client,
}

impl SyncApiClient {
    /// Create a new client with default configuration
    pub fn new() -> Result<Self, ApiError> {
        Self::with_config(ApiClientConfig::default())
    }

    /// Create a new client with custom configuration
    pub fn with_config(config: ApiClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ApiError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { config, http })
    }

    /// Get the configured API base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Handle API response and deserialize
    async fn handle_response<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&error_text)
                .ok()
                .and_then(|body| body.detail.or(body.error))
                .unwrap_or(error_text);

            warn!(status = status.as_u16(), %message, "Backend request failed");
            return Err(classify(status, message));
        }

        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn classify(status: StatusCode, message: String) -> ApiError {
    if status.is_client_error() {
        ApiError::Rejected {
            status: status.as_u16(),
            message,
        }
    } else {
        ApiError::Server {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl SwapApiPort for SyncApiClient {
    async fn quote(&self, request: &SwapRequest) -> Result<QuotePayload, ApiError> {
        debug!(
            from = %request.from_token,
            to = %request.to_token,
            amount = %request.amount,
            "Requesting quote"
        );
        let response = self.http.post(self.url("quote")).json(request).send().await?;
        let envelope: QuoteEnvelope = self.handle_response(response).await?;
        Ok(envelope.quote)
    }

    async fn swap(&self, request: &SwapRequest) -> Result<SwapSubmission, ApiError> {
        debug!(amount = %request.amount, user = %request.user_address, "Submitting swap");
        let response = self.http.post(self.url("swap")).json(request).send().await?;
        self.handle_response(response).await
    }

    async fn chains(&self) -> Result<Vec<RemoteChain>, ApiError> {
        let response = self.http.get(self.url("chains")).send().await?;
        let envelope: ChainsEnvelope = self.handle_response(response).await?;
        Ok(envelope.chains)
    }

    async fn transactions(&self, address: &str) -> Result<Vec<TransactionRecord>, ApiError> {
        let response = self
            .http
            .get(self.url(&format!("transactions/{}", address)))
            .send()
            .await?;
        let envelope: TransactionsEnvelope = self.handle_response(response).await?;
        Ok(envelope.transactions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SwapFormState;
    use approx::assert_relative_eq;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> SyncApiClient {
        SyncApiClient::with_config(ApiClientConfig {
            base_url: server.url(),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn request() -> SwapRequest {
        SwapRequest::from_form(
            &SwapFormState::default().with_amount("1.0"),
            0.5,
            "demo_address_123",
        )
    }

    #[test]
    fn test_config_default() {
        let config = ApiClientConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(SyncApiClient::new().is_ok());
    }

    #[tokio::test]
    async fn test_quote_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/quote")
            .match_body(Matcher::PartialJson(json!({
                "from_token": "ETH",
                "to_token": "SOL",
                "amount": "1.0",
                "slippage": 0.5,
                "user_address": "demo_address_123"
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"quote":{"to_amount":"19.85","execution_time":12,"price_impact":0.3,"bridge_fees":"0.001"}}"#)
            .create_async()
            .await;

        let quote = client_for(&server).quote(&request()).await.unwrap();
        assert_eq!(quote.to_amount, "19.85");
        assert_eq!(quote.execution_time, 12);
        assert_relative_eq!(quote.price_impact, 0.3);
        assert_eq!(quote.bridge_fees.as_deref(), Some("0.001"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejection_uses_detail() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/swap")
            .with_status(400)
            .with_body(r#"{"detail":"Token not found"}"#)
            .create_async()
            .await;

        let err = client_for(&server).swap(&request()).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Rejected { status: 400, message: "Token not found".into() }
        );
    }

    #[tokio::test]
    async fn test_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/quote")
            .with_status(500)
            .with_body("upstream exploded")
            .create_async()
            .await;

        let err = client_for(&server).quote(&request()).await.unwrap_err();
        assert_eq!(
            err,
            ApiError::Server { status: 500, message: "upstream exploded".into() }
        );
        assert!(!err.is_rejection());
    }

    #[tokio::test]
    async fn test_malformed_body_is_parse_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/quote")
            .with_status(200)
            .with_body(r#"{"quote":{"to_amount":"1"}}"#)
            .create_async()
            .await;

        let err = client_for(&server).quote(&request()).await.unwrap_err();
        assert!(matches!(err, ApiError::Parse(_)));
    }

    #[tokio::test]
    async fn test_swap_submission() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/swap")
            .with_status(200)
            .with_body(r#"{"transaction_id":"tx-42","status":"completed","tx_hash":"0xabc","to_amount":19.8}"#)
            .create_async()
            .await;

        let submission = client_for(&server).swap(&request()).await.unwrap();
        assert_eq!(submission.transaction_id, "tx-42");
        assert_eq!(submission.tx_hash.as_deref(), Some("0xabc"));
    }

    #[tokio::test]
    async fn test_chains_and_transactions() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/chains")
            .with_status(200)
            .with_body(r#"{"chains":[
                {"id":"ethereum","name":"Ethereum","currency_symbol":"ETH","chain_id":1},
                {"id":"solana","name":"Solana","currency_symbol":"SOL"}
            ]}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/api/transactions/0xabc")
            .with_status(200)
            .with_body(r#"{"transactions":[{"id":"tx-1","status":"completed","user_address":"0xabc"}]}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let chains = client.chains().await.unwrap();
        assert_eq!(chains.len(), 2);
        assert_eq!(chains[0].chain_id, Some(1));
        assert_eq!(chains[1].chain_id, None);

        let records = client.transactions("0xabc").await.unwrap();
        assert_eq!(records[0].id, "tx-1");
        assert_eq!(records[0].status, "completed");
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let client = SyncApiClient::with_config(ApiClientConfig {
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(2),
        })
        .unwrap();

        let err = client.chains().await.unwrap_err();
        assert!(matches!(err, ApiError::Network(_)));
    }
}
