//! Realtime push adapter

pub mod ws;

pub use ws::{ws_url_from_http, WsTransport, DEFAULT_WS_PATH};
