//! WebSocket transport over tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use crate::ports::{RealtimeConnection, RealtimeTransport, TransportError};

/// Socket path served by the backend
pub const DEFAULT_WS_PATH: &str = "/api/ws";

/// Derive the socket URL from the HTTP origin: `https` becomes `wss`,
/// `http` becomes `ws`. Returns `None` for any other scheme.
pub fn ws_url_from_http(base_url: &str, path: &str) -> Option<String> {
    let base = base_url.trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        return None;
    };
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };
    Some(format!("{}{}", rest, path))
}

/// Dials the backend push socket
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl RealtimeTransport for WsTransport {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn connect(&self) -> Result<Box<dyn RealtimeConnection>, TransportError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url = %self.url, "WebSocket connected");
        Ok(Box::new(WsConnection { ws }))
    }
}

struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl RealtimeConnection for WsConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.to_string())),
                Some(Ok(Message::Ping(payload))) => {
                    if let Err(error) = self.ws.send(Message::Pong(payload)).await {
                        return Some(Err(TransportError::Send(error.to_string())));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by server");
                    return None;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    warn!(len = bytes.len(), "Ignoring binary WebSocket frame");
                }
                Some(Ok(_)) => {}
                Some(Err(error)) => return Some(Err(TransportError::Receive(error.to_string()))),
                None => return None,
            }
        }
    }

    async fn close(&mut self) {
        if let Err(error) = self.ws.close(None).await {
            debug!(%error, "WebSocket close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ws_url_derivation() {
        assert_eq!(
            ws_url_from_http("https://api.sync.exchange", DEFAULT_WS_PATH).as_deref(),
            Some("wss://api.sync.exchange/api/ws")
        );
        assert_eq!(
            ws_url_from_http("http://localhost:8001/", "api/ws").as_deref(),
            Some("ws://localhost:8001/api/ws")
        );
        assert_eq!(ws_url_from_http("ftp://example.com", DEFAULT_WS_PATH), None);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let transport = WsTransport::new("ws://127.0.0.1:1/api/ws");
        assert_eq!(transport.endpoint(), "ws://127.0.0.1:1/api/ws");
        assert!(matches!(
            transport.connect().await,
            Err(TransportError::Connect(_))
        ));
    }
}
