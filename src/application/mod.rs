//! Application Layer - Session, quote, swap and realtime coordination

pub mod listeners;
pub mod quote_orchestrator;
pub mod realtime_channel;
pub mod session_manager;
pub mod swap_executor;
pub mod sync_client;

pub use listeners::{Listener, ListenerId, ListenerRegistry};
pub use quote_orchestrator::{
    QuoteError, QuoteOrchestrator, QuotePhase, QuoteSettings, QuoteView, RefreshOutcome,
    DEFAULT_QUOTE_TTL,
};
pub use realtime_channel::{
    ChannelSettings, ChannelState, ChannelStatus, RealtimeChannel, DEFAULT_HISTORY_CAPACITY,
    DEFAULT_RECONNECT_DELAY,
};
pub use session_manager::{SessionError, SessionEvent, WalletSessionManager};
pub use swap_executor::{SwapError, SwapExecutor};
pub use sync_client::SyncClient;
