//! Swap Executor
//!
//! Submits the current quote for execution and tracks the resulting ticket.
//! The ticket only moves forward, driven by realtime lifecycle events for its
//! transaction id or by an explicit reconciliation query.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::listeners::{Listener, ListenerId, ListenerRegistry};
use super::quote_orchestrator::QuoteOrchestrator;
use super::session_manager::WalletSessionManager;
use crate::domain::{ErrorKind, LifecycleState, SwapTicket};
use crate::ports::{swap_error_kind, ApiError, RealtimeEvent, SwapApiPort, SwapRequest};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SwapError {
    #[error("No wallet session is connected")]
    NotConnected,

    #[error("No valid quote to execute")]
    NoValidQuote,

    #[error("Swap rejected: {0}")]
    Rejected(ApiError),

    #[error("Swap service unavailable: {0}")]
    Unavailable(ApiError),
}

impl SwapError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SwapError::NotConnected => ErrorKind::NotConnected,
            SwapError::NoValidQuote => ErrorKind::QuoteUnavailable,
            SwapError::Rejected(_) => ErrorKind::SwapRejected,
            SwapError::Unavailable(_) => ErrorKind::SwapUnavailable,
        }
    }
}

impl From<ApiError> for SwapError {
    fn from(err: ApiError) -> Self {
        match swap_error_kind(&err) {
            ErrorKind::SwapRejected => SwapError::Rejected(err),
            _ => SwapError::Unavailable(err),
        }
    }
}

/// Lifecycle events kept for transactions without a ticket yet
const EARLY_EVENT_CAPACITY: usize = 32;

struct ExecutorState {
    ticket: Option<SwapTicket>,
    /// Address the current ticket was submitted from
    address: Option<String>,
    /// Lifecycle events that matched no ticket, oldest first. The backend can
    /// announce a transaction before the swap response returns.
    early_events: VecDeque<(String, LifecycleState)>,
}

impl ExecutorState {
    fn remember_early(&mut self, transaction_id: &str, next: LifecycleState) {
        if self.early_events.len() == EARLY_EVENT_CAPACITY {
            self.early_events.pop_front();
        }
        self.early_events.push_back((transaction_id.to_string(), next));
    }

    /// Remove and return buffered events for `transaction_id`, in arrival order
    fn take_early(&mut self, transaction_id: &str) -> Vec<LifecycleState> {
        let mut matched = Vec::new();
        self.early_events.retain(|(id, next)| {
            if id == transaction_id {
                matched.push(*next);
                false
            } else {
                true
            }
        });
        matched
    }
}

pub struct SwapExecutor {
    api: Arc<dyn SwapApiPort>,
    session: WalletSessionManager,
    quotes: Arc<QuoteOrchestrator>,
    state: RwLock<ExecutorState>,
    listeners: Arc<ListenerRegistry<SwapTicket>>,
}

impl SwapExecutor {
    pub fn new(
        api: Arc<dyn SwapApiPort>,
        session: WalletSessionManager,
        quotes: Arc<QuoteOrchestrator>,
    ) -> Self {
        Self {
            api,
            session,
            quotes,
            state: RwLock::new(ExecutorState {
                ticket: None,
                address: None,
                early_events: VecDeque::new(),
            }),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    /// Observe ticket creation and every lifecycle change
    pub fn subscribe(&self, listener: Listener<SwapTicket>) -> ListenerId {
        self.listeners.register(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.listeners.unregister(id)
    }

    pub fn updates(&self) -> (ListenerId, mpsc::UnboundedReceiver<SwapTicket>) {
        self.listeners.channel()
    }

    pub async fn ticket(&self) -> Option<SwapTicket> {
        self.state.read().await.ticket.clone()
    }

    /// Submit the current quote.
    ///
    /// The quote is consumed whatever the outcome. On failure no ticket is
    /// created and the previous ticket, if any, is kept.
    pub async fn execute(&self) -> Result<SwapTicket, SwapError> {
        let snapshot = self.session.snapshot().await;
        let Some(address) = snapshot.address().filter(|_| snapshot.is_connected()) else {
            return Err(SwapError::NotConnected);
        };

        let quote = self
            .quotes
            .take_for_execution(Utc::now())
            .await
            .filter(|q| q.address == address)
            .ok_or(SwapError::NoValidQuote)?;

        let request = SwapRequest::from_form(&quote.form, self.quotes.settings().slippage_pct, address);
        info!(quote_id = %quote.id, amount = %request.amount, "Executing swap");

        let submission = self.api.swap(&request).await.map_err(|e| {
            warn!(error = %e, "Swap submission failed");
            SwapError::from(e)
        })?;

        let mut ticket = SwapTicket::submitted(submission.transaction_id, quote.id, Utc::now());
        let completed = {
            let mut state = self.state.write().await;
            info!(transaction_id = %ticket.transaction_id, "Swap submitted");
            self.listeners.emit(&ticket);

            for next in state.take_early(&ticket.transaction_id) {
                if ticket.advance(next) {
                    info!(transaction_id = %ticket.transaction_id, state = %next, "Applied lifecycle event received before submission returned");
                    self.listeners.emit(&ticket);
                }
            }

            state.ticket = Some(ticket.clone());
            state.address = Some(address.to_string());
            ticket.lifecycle_state == LifecycleState::Completed
        };

        if completed {
            self.quotes.invalidate().await;
        }
        Ok(ticket)
    }

    /// Apply a realtime event. Returns the new lifecycle state if the event
    /// matched the current ticket and moved it forward.
    pub async fn handle_event(&self, event: &RealtimeEvent) -> Option<LifecycleState> {
        let (transaction_id, next) = match event {
            RealtimeEvent::TransactionStarted { transaction_id } => {
                (transaction_id, LifecycleState::Pending)
            }
            RealtimeEvent::TransactionCompleted { transaction_id } => {
                (transaction_id, LifecycleState::Completed)
            }
            RealtimeEvent::TransactionFailed { transaction_id, .. } => {
                (transaction_id, LifecycleState::Failed)
            }
            _ => return None,
        };
        self.advance(transaction_id, next).await
    }

    async fn advance(&self, transaction_id: &str, next: LifecycleState) -> Option<LifecycleState> {
        {
            let mut state = self.state.write().await;
            let matches = state
                .ticket
                .as_ref()
                .is_some_and(|t| t.transaction_id == transaction_id);
            if !matches {
                debug!(%transaction_id, %next, "Lifecycle event for unknown transaction; keeping it");
                state.remember_early(transaction_id, next);
                return None;
            }
            let ticket = state.ticket.as_mut()?;
            if !ticket.advance(next) {
                debug!(%transaction_id, current = %ticket.lifecycle_state, %next, "Ignoring lifecycle event");
                return None;
            }
            info!(%transaction_id, state = %next, "Swap lifecycle advanced");
            self.listeners.emit(ticket);
        }

        if next == LifecycleState::Completed {
            self.quotes.invalidate().await;
        }
        Some(next)
    }

    /// Ask the backend for the current ticket's status and apply it.
    /// Returns the new lifecycle state if it moved.
    pub async fn reconcile(&self) -> Result<Option<LifecycleState>, SwapError> {
        let (transaction_id, address) = {
            let state = self.state.read().await;
            match (&state.ticket, &state.address) {
                (Some(ticket), Some(address)) if !ticket.lifecycle_state.is_terminal() => {
                    (ticket.transaction_id.clone(), address.clone())
                }
                _ => return Ok(None),
            }
        };

        let records = self.api.transactions(&address).await?;
        let Some(record) = records.into_iter().find(|r| r.id == transaction_id) else {
            debug!(%transaction_id, "Backend has no record of the ticket yet");
            return Ok(None);
        };
        let Some(next) = LifecycleState::from_backend_status(&record.status) else {
            warn!(%transaction_id, status = %record.status, "Unknown backend transaction status");
            return Ok(None);
        };
        Ok(self.advance(&transaction_id, next).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::demo::DemoWallet;
    use crate::application::quote_orchestrator::QuoteSettings;
    use crate::domain::{ChainRegistry, ProviderKind, SwapFormState};
    use crate::ports::mocks::{quote_payload, MockSwapApi};
    use crate::ports::TransactionRecord;

    struct Fixture {
        api: MockSwapApi,
        session: WalletSessionManager,
        quotes: Arc<QuoteOrchestrator>,
        executor: SwapExecutor,
    }

    async fn fixture(api: MockSwapApi) -> Fixture {
        let session = WalletSessionManager::new(ChainRegistry::builtin())
            .with_adapter(Arc::new(DemoWallet::new()));
        let quotes = Arc::new(QuoteOrchestrator::new(
            Arc::new(api.clone()),
            QuoteSettings::default(),
        ));
        let executor = SwapExecutor::new(Arc::new(api.clone()), session.clone(), Arc::clone(&quotes));
        Fixture { api, session, quotes, executor }
    }

    async fn connected_with_quote(api: MockSwapApi) -> Fixture {
        let f = fixture(api.with_quote(quote_payload("19.85", 12, 0.3))).await;
        let session = f.session.connect(ProviderKind::Demo).await.unwrap();
        f.quotes.set_address(Some(session.address)).await;
        f.quotes
            .update(SwapFormState::default().with_amount("1.0"))
            .await
            .unwrap();
        f
    }

    fn completed(id: &str) -> RealtimeEvent {
        RealtimeEvent::TransactionCompleted { transaction_id: id.to_string() }
    }

    #[tokio::test]
    async fn test_execute_creates_submitted_ticket() {
        let f = connected_with_quote(MockSwapApi::new().with_swap("tx-1")).await;

        let ticket = f.executor.execute().await.unwrap();
        assert_eq!(ticket.transaction_id, "tx-1");
        assert_eq!(ticket.lifecycle_state, LifecycleState::Submitted);
        assert!(f.quotes.current_quote().await.is_none());

        let sent = &f.api.swap_requests()[0];
        assert_eq!(sent.amount, "1.0");
        assert_eq!(sent.user_address, "demo_address_123");
    }

    #[tokio::test]
    async fn test_lifecycle_follows_matching_events() {
        let f = connected_with_quote(MockSwapApi::new().with_swap("tx-1")).await;
        f.executor.execute().await.unwrap();

        assert_eq!(f.executor.handle_event(&completed("tx-other")).await, None);
        assert_eq!(
            f.executor.ticket().await.unwrap().lifecycle_state,
            LifecycleState::Submitted
        );

        let started = RealtimeEvent::TransactionStarted { transaction_id: "tx-1".into() };
        assert_eq!(f.executor.handle_event(&started).await, Some(LifecycleState::Pending));
        assert_eq!(
            f.executor.handle_event(&completed("tx-1")).await,
            Some(LifecycleState::Completed)
        );

        // Terminal state is sticky
        let failed = RealtimeEvent::TransactionFailed { transaction_id: "tx-1".into(), reason: None };
        assert_eq!(f.executor.handle_event(&failed).await, None);
        assert_eq!(f.executor.handle_event(&started).await, None);
    }

    #[tokio::test]
    async fn test_failed_event() {
        let f = connected_with_quote(MockSwapApi::new().with_swap("tx-1")).await;
        f.executor.execute().await.unwrap();

        let failed = RealtimeEvent::TransactionFailed {
            transaction_id: "tx-1".into(),
            reason: Some("slippage".into()),
        };
        assert_eq!(f.executor.handle_event(&failed).await, Some(LifecycleState::Failed));
    }

    #[tokio::test]
    async fn test_execute_preconditions() {
        let f = fixture(MockSwapApi::new().with_swap("tx-1")).await;
        assert_eq!(f.executor.execute().await, Err(SwapError::NotConnected));

        f.session.connect(ProviderKind::Demo).await.unwrap();
        assert_eq!(f.executor.execute().await, Err(SwapError::NoValidQuote));
        assert!(f.api.swap_requests().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_swap_clears_quote_without_ticket() {
        let api = MockSwapApi::new().with_swap_error(ApiError::Rejected {
            status: 400,
            message: "Token not found".into(),
        });
        let f = connected_with_quote(api).await;

        let err = f.executor.execute().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SwapRejected);
        assert!(f.executor.ticket().await.is_none());
        assert!(f.quotes.current_quote().await.is_none());

        // Quote is never reused for a second submission
        assert_eq!(f.executor.execute().await, Err(SwapError::NoValidQuote));
    }

    #[tokio::test]
    async fn test_unavailable_swap() {
        let api = MockSwapApi::new().with_swap_error(ApiError::Server {
            status: 502,
            message: "bad gateway".into(),
        });
        let f = connected_with_quote(api).await;
        assert_eq!(f.executor.execute().await.unwrap_err().kind(), ErrorKind::SwapUnavailable);
    }

    #[tokio::test]
    async fn test_reconcile_applies_backend_status() {
        let f = connected_with_quote(MockSwapApi::new().with_swap("tx-1")).await;
        assert_eq!(f.executor.reconcile().await, Ok(None));

        f.executor.execute().await.unwrap();
        assert_eq!(f.executor.reconcile().await, Ok(None));

        f.api.set_transactions(vec![TransactionRecord {
            id: "tx-1".into(),
            status: "completed".into(),
            tx_hash: None,
        }]);
        assert_eq!(f.executor.reconcile().await, Ok(Some(LifecycleState::Completed)));
        assert_eq!(f.executor.reconcile().await, Ok(None));
    }

    #[tokio::test]
    async fn test_events_before_submission_returns_are_applied() {
        let f = connected_with_quote(MockSwapApi::new().with_swap("tx-1")).await;
        let (_, mut updates) = f.executor.updates();

        let started = RealtimeEvent::TransactionStarted { transaction_id: "tx-1".into() };
        assert_eq!(f.executor.handle_event(&started).await, None);
        assert_eq!(f.executor.handle_event(&completed("tx-1")).await, None);
        assert_eq!(f.executor.handle_event(&completed("tx-other")).await, None);

        let ticket = f.executor.execute().await.unwrap();
        assert_eq!(ticket.lifecycle_state, LifecycleState::Completed);
        assert_eq!(
            f.executor.ticket().await.unwrap().lifecycle_state,
            LifecycleState::Completed
        );

        let states: Vec<_> = [
            updates.recv().await.unwrap(),
            updates.recv().await.unwrap(),
            updates.recv().await.unwrap(),
        ]
        .iter()
        .map(|t| t.lifecycle_state)
        .collect();
        assert_eq!(
            states,
            vec![LifecycleState::Submitted, LifecycleState::Pending, LifecycleState::Completed]
        );

        // Consumed events are not replayed into a later ticket with the same id
        let mut state = f.executor.state.write().await;
        assert!(state.take_early("tx-1").is_empty());
        assert_eq!(state.take_early("tx-other"), vec![LifecycleState::Completed]);
    }

    #[test]
    fn test_early_event_buffer_is_bounded() {
        let mut state = ExecutorState {
            ticket: None,
            address: None,
            early_events: VecDeque::new(),
        };
        for i in 0..EARLY_EVENT_CAPACITY + 5 {
            state.remember_early(&format!("tx-{}", i), LifecycleState::Pending);
        }
        assert_eq!(state.early_events.len(), EARLY_EVENT_CAPACITY);
        assert!(state.take_early("tx-0").is_empty());
        assert_eq!(state.take_early("tx-5"), vec![LifecycleState::Pending]);
    }

    #[tokio::test]
    async fn test_ticket_updates_are_published() {
        let f = connected_with_quote(MockSwapApi::new().with_swap("tx-1")).await;
        let (_, mut updates) = f.executor.updates();

        f.executor.execute().await.unwrap();
        f.executor.handle_event(&completed("tx-1")).await;

        assert_eq!(updates.recv().await.unwrap().lifecycle_state, LifecycleState::Submitted);
        assert_eq!(updates.recv().await.unwrap().lifecycle_state, LifecycleState::Completed);
    }
}
