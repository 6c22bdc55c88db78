//! Client wiring
//!
//! Connects the components along the data flow: session events drive the
//! quote address and the realtime subscription; realtime events drive the
//! swap ticket and price-based quote invalidation.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::quote_orchestrator::{QuoteOrchestrator, QuoteSettings};
use super::realtime_channel::{ChannelSettings, RealtimeChannel};
use super::session_manager::{SessionError, SessionEvent, WalletSessionManager};
use super::swap_executor::SwapExecutor;
use crate::domain::{ProviderKind, Session};
use crate::ports::{ApiError, RealtimeEvent, RealtimeTransport, SwapApiPort};

pub struct SyncClient {
    api: Arc<dyn SwapApiPort>,
    session: WalletSessionManager,
    quotes: Arc<QuoteOrchestrator>,
    executor: Arc<SwapExecutor>,
    channel: RealtimeChannel,
    tasks: Vec<JoinHandle<()>>,
}

impl SyncClient {
    /// Wire the components and start the event pumps. Must run inside a
    /// tokio runtime.
    pub fn new(
        session: WalletSessionManager,
        api: Arc<dyn SwapApiPort>,
        transport: Arc<dyn RealtimeTransport>,
        quote_settings: QuoteSettings,
        channel_settings: ChannelSettings,
    ) -> Self {
        let quotes = Arc::new(QuoteOrchestrator::new(Arc::clone(&api), quote_settings));
        let executor = Arc::new(SwapExecutor::new(
            Arc::clone(&api),
            session.clone(),
            Arc::clone(&quotes),
        ));
        let channel = RealtimeChannel::new(transport, channel_settings);

        let tasks = vec![
            spawn_session_pump(&session, Arc::clone(&quotes), channel.clone()),
            spawn_realtime_pump(&channel, Arc::clone(&quotes), Arc::clone(&executor)),
        ];

        Self {
            api,
            session,
            quotes,
            executor,
            channel,
            tasks,
        }
    }

    pub fn session(&self) -> &WalletSessionManager {
        &self.session
    }

    pub fn quotes(&self) -> &Arc<QuoteOrchestrator> {
        &self.quotes
    }

    pub fn executor(&self) -> &Arc<SwapExecutor> {
        &self.executor
    }

    pub fn channel(&self) -> &RealtimeChannel {
        &self.channel
    }

    /// Connect a wallet and bind quotes and the realtime channel to its
    /// address before returning
    pub async fn connect(&self, kind: ProviderKind) -> Result<Session, SessionError> {
        let session = self.session.connect(kind).await?;
        bind_address(&self.quotes, &self.channel, Some(&session.address)).await;
        Ok(session)
    }

    /// Connect a wallet by name and bind it like [`SyncClient::connect`]
    pub async fn connect_wallet(&self, name: &str) -> Result<Session, SessionError> {
        let session = self.session.connect_wallet(name).await?;
        bind_address(&self.quotes, &self.channel, Some(&session.address)).await;
        Ok(session)
    }

    pub async fn disconnect(&self) {
        self.session.disconnect().await;
        bind_address(&self.quotes, &self.channel, None).await;
    }

    /// Merge the backend chain list into the session manager's registry.
    /// Returns the number of known chains afterwards.
    pub async fn refresh_chains(&self) -> Result<usize, ApiError> {
        let remote = self.api.chains().await?;
        let merged = self.session.registry().merged_with(&remote);
        let count = merged.len();
        self.session.set_registry(merged);
        info!(chains = count, "Chain registry refreshed");
        Ok(count)
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
        self.channel.stop();
    }
}

async fn bind_address(quotes: &QuoteOrchestrator, channel: &RealtimeChannel, address: Option<&str>) {
    quotes.set_address(address.map(str::to_string)).await;
    channel.set_address(address);
}

/// Session events only signal that the binding may have changed. The pump
/// binds the manager's current address, so events queued behind a later
/// connect or disconnect cannot roll the binding back.
fn spawn_session_pump(
    session: &WalletSessionManager,
    quotes: Arc<QuoteOrchestrator>,
    channel: RealtimeChannel,
) -> JoinHandle<()> {
    let (_, mut events) = session.events();
    let session = session.clone();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::SessionOpened(_)
                | SessionEvent::AccountChanged { .. }
                | SessionEvent::SessionClosed { .. } => {
                    let snapshot = session.snapshot().await;
                    let address = snapshot.address().filter(|_| snapshot.is_connected());
                    bind_address(&quotes, &channel, address).await;
                }
                SessionEvent::ChainChanged { .. } | SessionEvent::SessionError(_) => {}
            }
        }
    })
}

fn spawn_realtime_pump(
    channel: &RealtimeChannel,
    quotes: Arc<QuoteOrchestrator>,
    executor: Arc<SwapExecutor>,
) -> JoinHandle<()> {
    let (_, mut events) = channel.events();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match &event {
                RealtimeEvent::PriceUpdate { token, .. } => {
                    quotes.on_price_update(token).await;
                }
                RealtimeEvent::Other { kind, .. } => {
                    debug!(kind = %kind, "Unhandled realtime event");
                }
                _ => {
                    executor.handle_event(&event).await;
                }
            }
        }
    })
}
