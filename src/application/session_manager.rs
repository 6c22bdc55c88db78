//! Wallet Session Manager
//!
//! Owns at most one live wallet session. Selects an adapter by provider kind
//! or by wallet name, drives the connect/disconnect state machine, turns provider
//! notifications into session events and runs the switch/add-chain protocol.
//!
//! Every event is emitted while the state lock is held, so listeners observe
//! events in exactly the order the transitions happened.

use std::sync::{Arc, Weak};

use futures_util::StreamExt;
use rust_decimal::Decimal;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::listeners::{Listener, ListenerId, ListenerRegistry};
use crate::domain::{
    ChainId, ChainRegistry, ErrorKind, ProviderKind, Session, SessionSnapshot, SessionStatus,
};
use crate::ports::{NotificationStream, ProviderNotification, WalletError, WalletProvider};

/// Failure of a session-level operation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error(transparent)]
    Wallet(#[from] WalletError),

    #[error("No {0} wallet adapter is registered")]
    NoAdapter(ProviderKind),

    #[error("No wallet named {0} is registered")]
    UnknownWallet(String),

    #[error("Another session operation is in progress")]
    Busy,

    #[error("No wallet session is connected")]
    NotConnected,

    #[error("Switch to chain {chain_id} failed: {reason}")]
    ChainSwitchFailed { chain_id: u64, reason: String },

    #[error("Operation cancelled by disconnect")]
    Cancelled,
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Wallet(e) => e.kind(),
            SessionError::NoAdapter(_) | SessionError::UnknownWallet(_) => {
                ErrorKind::ProviderUnavailable
            }
            SessionError::Busy => ErrorKind::SessionBusy,
            SessionError::NotConnected => ErrorKind::NotConnected,
            SessionError::ChainSwitchFailed { .. } => ErrorKind::ChainSwitchFailed,
            SessionError::Cancelled => ErrorKind::Cancelled,
        }
    }
}

/// Event observed by session subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SessionOpened(Session),
    AccountChanged { previous: String, address: String },
    ChainChanged { previous: ChainId, chain_id: ChainId },
    SessionClosed { provider_kind: ProviderKind, address: String },
    SessionError(SessionError),
}

impl SessionEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionOpened(_) => "session_opened",
            SessionEvent::AccountChanged { .. } => "account_changed",
            SessionEvent::ChainChanged { .. } => "chain_changed",
            SessionEvent::SessionClosed { .. } => "session_closed",
            SessionEvent::SessionError(_) => "session_error",
        }
    }
}

struct ManagerState {
    status: SessionStatus,
    session: Option<Session>,
    adapter: Option<Arc<dyn WalletProvider>>,
    /// Bumped whenever the current session (or connect attempt) ends
    epoch: u64,
    /// Epoch of the switch in flight, if any
    switch_epoch: Option<u64>,
    pump: Option<JoinHandle<()>>,
}

impl ManagerState {
    fn transition(&mut self, next: SessionStatus) {
        debug_assert!(
            self.status.can_transition_to(next),
            "illegal session transition {} -> {}",
            self.status,
            next
        );
        info!(from = %self.status, to = %next, "Session transition");
        self.status = next;
        if let Some(session) = self.session.as_mut() {
            session.status = next;
        }
    }
}

struct Inner {
    /// Registration order; the first adapter of a kind is that kind's default
    adapters: parking_lot::RwLock<Vec<Arc<dyn WalletProvider>>>,
    registry: parking_lot::RwLock<Arc<ChainRegistry>>,
    state: RwLock<ManagerState>,
    listeners: Arc<ListenerRegistry<SessionEvent>>,
}

/// Handle to the session manager; clones share the same session
#[derive(Clone)]
pub struct WalletSessionManager {
    inner: Arc<Inner>,
}

/// What a closed session leaves behind for teardown outside the lock
struct Teardown {
    adapter: Option<Arc<dyn WalletProvider>>,
    pump: Option<JoinHandle<()>>,
}

impl Teardown {
    async fn run(self) {
        if let Some(pump) = self.pump {
            pump.abort();
        }
        if let Some(adapter) = self.adapter {
            if let Err(e) = adapter.disconnect().await {
                warn!(wallet = adapter.name(), error = %e, "Wallet disconnect failed");
            }
        }
    }
}

impl WalletSessionManager {
    pub fn new(registry: ChainRegistry) -> Self {
        Self {
            inner: Arc::new(Inner {
                adapters: parking_lot::RwLock::new(Vec::new()),
                registry: parking_lot::RwLock::new(Arc::new(registry)),
                state: RwLock::new(ManagerState {
                    status: SessionStatus::Disconnected,
                    session: None,
                    adapter: None,
                    epoch: 0,
                    switch_epoch: None,
                    pump: None,
                }),
                listeners: Arc::new(ListenerRegistry::new()),
            }),
        }
    }

    /// Builder: make an adapter selectable by its kind and name
    pub fn with_adapter(self, adapter: Arc<dyn WalletProvider>) -> Self {
        self.register_adapter(adapter);
        self
    }

    /// Replaces any adapter previously registered under the same name
    /// (case-insensitive). Several adapters may share a kind.
    pub fn register_adapter(&self, adapter: Arc<dyn WalletProvider>) {
        let mut adapters = self.inner.adapters.write();
        match adapters
            .iter_mut()
            .find(|a| a.name().eq_ignore_ascii_case(adapter.name()))
        {
            Some(slot) => *slot = adapter,
            None => adapters.push(adapter),
        }
    }

    /// Registered wallets as `(name, kind)`, in registration order
    pub fn wallets(&self) -> Vec<(String, ProviderKind)> {
        self.inner
            .adapters
            .read()
            .iter()
            .map(|a| (a.name().to_string(), a.kind()))
            .collect()
    }

    pub fn registry(&self) -> Arc<ChainRegistry> {
        Arc::clone(&self.inner.registry.read())
    }

    /// Swap in a new registry, e.g. after merging the backend chain list
    pub fn set_registry(&self, registry: ChainRegistry) {
        *self.inner.registry.write() = Arc::new(registry);
    }

    // ------------------------------------------------------------------
    // Subscription
    // ------------------------------------------------------------------

    pub fn subscribe(&self, listener: Listener<SessionEvent>) -> ListenerId {
        self.inner.listeners.register(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unregister(id)
    }

    /// Subscribe through a channel, for async consumers
    pub fn events(&self) -> (ListenerId, mpsc::UnboundedReceiver<SessionEvent>) {
        self.inner.listeners.channel()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.state.read().await;
        SessionSnapshot {
            status: state.status,
            session: state.session.clone(),
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.inner.state.read().await.status
    }

    pub async fn is_connected(&self) -> bool {
        self.snapshot().await.is_connected()
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Connect the first wallet registered for `kind`.
    ///
    /// A live session is closed first. Rejected with `Busy` while another
    /// connect is in flight.
    pub async fn connect(&self, kind: ProviderKind) -> Result<Session, SessionError> {
        let adapter = self
            .inner
            .adapters
            .read()
            .iter()
            .find(|a| a.kind() == kind)
            .cloned();
        let Some(adapter) = adapter else {
            return Err(self.inner.fail(SessionError::NoAdapter(kind)));
        };
        self.open(adapter).await
    }

    /// Connect a specific wallet by name, e.g. "Coinbase Wallet" when
    /// MetaMask is registered for the same kind
    pub async fn connect_wallet(&self, name: &str) -> Result<Session, SessionError> {
        let adapter = self
            .inner
            .adapters
            .read()
            .iter()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .cloned();
        let Some(adapter) = adapter else {
            return Err(self.inner.fail(SessionError::UnknownWallet(name.to_string())));
        };
        self.open(adapter).await
    }

    async fn open(&self, adapter: Arc<dyn WalletProvider>) -> Result<Session, SessionError> {
        let kind = adapter.kind();
        let (epoch, teardown) = {
            let mut state = self.inner.state.write().await;
            if state.status == SessionStatus::Connecting {
                return Err(self.inner.fail(SessionError::Busy));
            }
            let teardown = self.inner.close_locked(&mut state);
            state.epoch += 1;
            state.transition(SessionStatus::Connecting);
            (state.epoch, teardown)
        };
        teardown.run().await;

        info!(wallet = adapter.name(), %kind, "Connecting wallet");
        let notifications = adapter.notifications();
        let result = adapter.connect().await;

        let mut state = self.inner.state.write().await;
        if state.epoch != epoch {
            drop(state);
            debug!(wallet = adapter.name(), "Connect superseded by disconnect");
            if result.is_ok() {
                Teardown { adapter: Some(adapter), pump: None }.run().await;
            }
            return Err(self.inner.fail(SessionError::Cancelled));
        }

        match result {
            Ok(connection) => {
                let session = Session {
                    provider_kind: kind,
                    address: connection.address,
                    chain_id: connection.chain_id,
                    status: SessionStatus::Connected,
                };
                state.session = Some(session.clone());
                state.adapter = Some(Arc::clone(&adapter));
                state.transition(SessionStatus::Connected);
                state.pump = Some(spawn_pump(Arc::downgrade(&self.inner), epoch, notifications));
                info!(address = %session.address, chain = %session.chain_id, "Session opened");
                self.inner.listeners.emit(&SessionEvent::SessionOpened(session.clone()));
                Ok(session)
            }
            Err(e) => {
                state.transition(SessionStatus::Disconnected);
                warn!(wallet = adapter.name(), error = %e, "Wallet connect failed");
                Err(self.inner.fail(SessionError::Wallet(e)))
            }
        }
    }

    /// End the session. Idempotent; `session_closed` is emitted only when a
    /// session actually existed.
    pub async fn disconnect(&self) {
        let teardown = {
            let mut state = self.inner.state.write().await;
            match state.status {
                SessionStatus::Disconnected => return,
                SessionStatus::Connecting => {
                    state.epoch += 1;
                    state.transition(SessionStatus::Disconnected);
                    return;
                }
                SessionStatus::Connected | SessionStatus::Error => {
                    self.inner.close_locked(&mut state)
                }
            }
        };
        teardown.run().await;
    }

    /// Move the connected wallet to EVM chain `chain_id`.
    ///
    /// If the wallet does not know the chain, its registry descriptor is
    /// added once and the switch retried once. Any failure on that path is
    /// `ChainSwitchFailed` and leaves the session chain untouched.
    pub async fn switch_chain(&self, chain_id: u64) -> Result<ChainId, SessionError> {
        let (adapter, epoch) = {
            let mut state = self.inner.state.write().await;
            if state.status != SessionStatus::Connected {
                return Err(self.inner.fail(SessionError::NotConnected));
            }
            if state.switch_epoch.is_some() {
                return Err(self.inner.fail(SessionError::Busy));
            }
            let Some(adapter) = state.adapter.clone() else {
                return Err(self.inner.fail(SessionError::NotConnected));
            };
            state.switch_epoch = Some(state.epoch);
            (adapter, state.epoch)
        };

        let result = self.run_switch(adapter.as_ref(), chain_id).await;

        let mut state = self.inner.state.write().await;
        if state.switch_epoch == Some(epoch) {
            state.switch_epoch = None;
        }
        if state.epoch != epoch || state.status != SessionStatus::Connected {
            return Err(self.inner.fail(SessionError::Cancelled));
        }

        match result {
            Ok(()) => {
                let target = ChainId::Evm(chain_id);
                self.inner.apply_chain(&mut state, target);
                Ok(target)
            }
            Err(e) => {
                warn!(chain_id, error = %e, "Chain switch failed");
                Err(self.inner.fail(e))
            }
        }
    }

    async fn run_switch(
        &self,
        adapter: &dyn WalletProvider,
        chain_id: u64,
    ) -> Result<(), SessionError> {
        match adapter.switch_chain(chain_id).await {
            Ok(()) => Ok(()),
            Err(WalletError::ChainUnknownToWallet(_)) => {
                let registry = self.registry();
                let descriptor = registry.get(chain_id).ok_or_else(|| {
                    SessionError::ChainSwitchFailed {
                        chain_id,
                        reason: "chain is not in the registry".to_string(),
                    }
                })?;

                info!(chain_id, name = %descriptor.name, "Adding chain to wallet");
                adapter.add_chain(descriptor).await.map_err(|e| {
                    SessionError::ChainSwitchFailed {
                        chain_id,
                        reason: format!("add chain: {}", e),
                    }
                })?;

                adapter.switch_chain(chain_id).await.map_err(|e| {
                    SessionError::ChainSwitchFailed {
                        chain_id,
                        reason: format!("retry: {}", e),
                    }
                })
            }
            Err(e) => Err(SessionError::Wallet(e)),
        }
    }

    /// Sign `message` with the connected wallet
    pub async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, SessionError> {
        let adapter = self.connected_adapter().await?;
        adapter
            .sign_message(message)
            .await
            .map_err(|e| self.inner.fail(SessionError::Wallet(e)))
    }

    /// Native-currency balance of the connected account
    pub async fn get_balance(&self) -> Result<Decimal, SessionError> {
        let adapter = self.connected_adapter().await?;
        adapter
            .get_balance()
            .await
            .map_err(|e| self.inner.fail(SessionError::Wallet(e)))
    }

    async fn connected_adapter(&self) -> Result<Arc<dyn WalletProvider>, SessionError> {
        let state = self.inner.state.read().await;
        match (&state.status, &state.adapter) {
            (SessionStatus::Connected, Some(adapter)) => Ok(Arc::clone(adapter)),
            _ => Err(self.inner.fail(SessionError::NotConnected)),
        }
    }
}

impl Inner {
    /// Emit `session_error` and hand the error back for the caller's result
    fn fail(&self, err: SessionError) -> SessionError {
        self.listeners.emit(&SessionEvent::SessionError(err.clone()));
        err
    }

    /// Drop the live session, if any, and emit `session_closed`
    fn close_locked(&self, state: &mut ManagerState) -> Teardown {
        let session = state.session.take();
        let teardown = Teardown {
            adapter: state.adapter.take(),
            pump: state.pump.take(),
        };
        state.switch_epoch = None;
        if matches!(state.status, SessionStatus::Connected | SessionStatus::Error) {
            state.epoch += 1;
            state.transition(SessionStatus::Disconnected);
        }
        if let Some(session) = session {
            info!(address = %session.address, "Session closed");
            self.listeners.emit(&SessionEvent::SessionClosed {
                provider_kind: session.provider_kind,
                address: session.address,
            });
        }
        teardown
    }

    fn apply_chain(&self, state: &mut ManagerState, chain_id: ChainId) {
        let Some(session) = state.session.as_mut() else {
            return;
        };
        if session.chain_id == chain_id {
            return;
        }
        let previous = std::mem::replace(&mut session.chain_id, chain_id);
        info!(%previous, %chain_id, "Chain changed");
        self.listeners
            .emit(&SessionEvent::ChainChanged { previous, chain_id });
    }

    /// Apply one provider notification. Returns false once the pump should stop.
    async fn apply_notification(&self, epoch: u64, notification: ProviderNotification) -> bool {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.status != SessionStatus::Connected {
            return false;
        }

        match notification {
            ProviderNotification::AccountsChanged(accounts) => match accounts.into_iter().next() {
                None => {
                    info!("Wallet revoked all accounts");
                    // The pump is the caller and returns on its own; the
                    // wallet already dropped us, so no disconnect call either
                    drop(self.close_locked(&mut state));
                    false
                }
                Some(address) => {
                    if let Some(session) = state.session.as_mut() {
                        if session.address != address {
                            let previous = std::mem::replace(&mut session.address, address.clone());
                            info!(%previous, %address, "Account changed");
                            self.listeners
                                .emit(&SessionEvent::AccountChanged { previous, address });
                        }
                    }
                    true
                }
            },
            ProviderNotification::ChainChanged(chain_id) => {
                self.apply_chain(&mut state, chain_id);
                true
            }
        }
    }

    /// Notification stream ended while the session was live
    async fn provider_lost(&self, epoch: u64) {
        let mut state = self.state.write().await;
        if state.epoch != epoch || state.status != SessionStatus::Connected {
            return;
        }
        warn!("Wallet notification stream ended; dropping session");
        state.transition(SessionStatus::Error);
        self.fail(SessionError::Wallet(WalletError::ProviderUnavailable(
            "wallet stopped responding".to_string(),
        )));
        drop(self.close_locked(&mut state));
    }
}

fn spawn_pump(inner: Weak<Inner>, epoch: u64, mut stream: NotificationStream) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(notification) = stream.next().await {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            if !inner.apply_notification(epoch, notification).await {
                return;
            }
        }
        if let Some(inner) = inner.upgrade() {
            inner.provider_lost(epoch).await;
        }
    })
}
