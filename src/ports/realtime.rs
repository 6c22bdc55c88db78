//! Realtime push port
//!
//! Bidirectional text socket carrying the subscribe handshake outbound and
//! typed JSON events inbound.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::domain::ErrorKind;

/// Socket-level failure
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    Connect(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed")]
    Closed,
}

impl TransportError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::TransportError
    }
}

/// Factory for push connections
#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    /// Endpoint this transport dials, for logging
    fn endpoint(&self) -> &str;

    /// Open a fresh connection
    async fn connect(&self) -> Result<Box<dyn RealtimeConnection>, TransportError>;
}

/// One open push connection
#[async_trait]
pub trait RealtimeConnection: Send {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Next inbound text frame; `None` once the peer closed the connection.
    /// Must be cancel safe.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

/// Outbound handshake
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeMessage<'a> {
    pub kind: &'static str,
    pub user_address: &'a str,
}

impl<'a> SubscribeMessage<'a> {
    pub fn new(user_address: &'a str) -> Self {
        Self {
            kind: "subscribe",
            user_address,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::json!({ "type": self.kind, "user_address": self.user_address }).to_string()
    }
}

/// Typed inbound event
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeEvent {
    TransactionStarted { transaction_id: String },
    TransactionCompleted { transaction_id: String },
    TransactionFailed { transaction_id: String, reason: Option<String> },
    PriceUpdate { token: String, price_usd: Option<f64> },
    /// Well-formed event of a type this client does not interpret
    Other { kind: String, payload: Value },
}

impl RealtimeEvent {
    /// Wire `type` tag
    pub fn kind(&self) -> &str {
        match self {
            RealtimeEvent::TransactionStarted { .. } => "transaction_started",
            RealtimeEvent::TransactionCompleted { .. } => "transaction_completed",
            RealtimeEvent::TransactionFailed { .. } => "transaction_failed",
            RealtimeEvent::PriceUpdate { .. } => "price_update",
            RealtimeEvent::Other { kind, .. } => kind.as_str(),
        }
    }

    /// Transaction id for lifecycle events
    pub fn transaction_id(&self) -> Option<&str> {
        match self {
            RealtimeEvent::TransactionStarted { transaction_id }
            | RealtimeEvent::TransactionCompleted { transaction_id }
            | RealtimeEvent::TransactionFailed { transaction_id, .. } => Some(transaction_id),
            _ => None,
        }
    }
}

/// Why an inbound frame was dropped
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MalformedEvent {
    #[error("not valid JSON: {0}")]
    InvalidJson(String),

    #[error("payload is not an object with a string `type`")]
    MissingType,

    #[error("`{kind}` event missing field `{field}`")]
    MissingField { kind: String, field: &'static str },
}

/// Transaction id from either `transaction_id` or a nested `transaction.id`
fn transaction_id_of(value: &Value) -> Option<String> {
    value
        .get("transaction_id")
        .and_then(Value::as_str)
        .or_else(|| value.get("transaction").and_then(|t| t.get("id")).and_then(Value::as_str))
        .map(str::to_string)
}

/// Decode one inbound text frame
pub fn parse_event(text: &str) -> Result<RealtimeEvent, MalformedEvent> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| MalformedEvent::InvalidJson(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(MalformedEvent::MissingType)?
        .to_string();

    let missing = |field: &'static str| MalformedEvent::MissingField {
        kind: kind.clone(),
        field,
    };

    let event = match kind.as_str() {
        "transaction_started" => RealtimeEvent::TransactionStarted {
            transaction_id: transaction_id_of(&value).ok_or_else(|| missing("transaction_id"))?,
        },
        "transaction_completed" => RealtimeEvent::TransactionCompleted {
            transaction_id: transaction_id_of(&value).ok_or_else(|| missing("transaction_id"))?,
        },
        "transaction_failed" => RealtimeEvent::TransactionFailed {
            transaction_id: transaction_id_of(&value).ok_or_else(|| missing("transaction_id"))?,
            reason: value.get("error").and_then(Value::as_str).map(str::to_string),
        },
        "price_update" => RealtimeEvent::PriceUpdate {
            token: value
                .get("token")
                .and_then(Value::as_str)
                .ok_or_else(|| missing("token"))?
                .to_string(),
            price_usd: value
                .get("price_usd")
                .or_else(|| value.get("price"))
                .and_then(Value::as_f64),
        },
        _ => RealtimeEvent::Other {
            kind: kind.clone(),
            payload: value,
        },
    };
    Ok(event)
}
