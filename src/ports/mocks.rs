//! Scripted port doubles
//!
//! Deterministic stand-ins for wallets, the swap backend and the push socket.
//! They record every call and let a test decide when and how each request
//! completes.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream;
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot, Notify};

use super::realtime::{RealtimeConnection, RealtimeTransport, TransportError};
use super::swap_api::{
    ApiError, QuotePayload, SwapApiPort, SwapRequest, SwapSubmission, TransactionRecord,
};
use super::wallet::{
    NotificationStream, ProviderNotification, WalletConnection, WalletError, WalletProvider,
};
use crate::domain::{ChainDescriptor, ChainId, ProviderKind, RemoteChain};

// ============================================================================
// Wallet
// ============================================================================

/// Call recorded by [`ScriptedWallet`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletCall {
    Connect,
    Disconnect,
    SwitchChain(u64),
    AddChain(u64),
    SignMessage(Vec<u8>),
    GetBalance,
}

#[derive(Debug)]
struct WalletScript {
    connect_result: Result<WalletConnection, WalletError>,
    switch_results: VecDeque<Result<(), WalletError>>,
    add_chain_result: Result<(), WalletError>,
    sign_result: Result<Vec<u8>, WalletError>,
    balance_result: Result<Decimal, WalletError>,
    hold_connect: bool,
    calls: Vec<WalletCall>,
    chain_id: ChainId,
}

/// Wallet whose every answer is scripted by the test
#[derive(Clone)]
pub struct ScriptedWallet {
    kind: ProviderKind,
    name: String,
    script: Arc<Mutex<WalletScript>>,
    notifiers: Arc<Mutex<Vec<mpsc::UnboundedSender<ProviderNotification>>>>,
    connect_gate: Arc<Notify>,
}

impl ScriptedWallet {
    pub fn new(kind: ProviderKind, address: &str, chain_id: ChainId) -> Self {
        let name = match kind {
            ProviderKind::Evm => "MetaMask",
            ProviderKind::Solana => "Phantom",
            ProviderKind::Demo => "Demo Wallet",
        };
        Self {
            kind,
            name: name.to_string(),
            script: Arc::new(Mutex::new(WalletScript {
                connect_result: Ok(WalletConnection {
                    address: address.to_string(),
                    chain_id,
                }),
                switch_results: VecDeque::new(),
                add_chain_result: Ok(()),
                sign_result: Ok(vec![0xAB; 65]),
                balance_result: Ok(Decimal::ZERO),
                hold_connect: false,
                calls: Vec::new(),
                chain_id,
            })),
            notifiers: Arc::new(Mutex::new(Vec::new())),
            connect_gate: Arc::new(Notify::new()),
        }
    }

    pub fn evm(address: &str, chain_id: u64) -> Self {
        Self::new(ProviderKind::Evm, address, ChainId::Evm(chain_id))
    }

    pub fn solana(address: &str) -> Self {
        Self::new(ProviderKind::Solana, address, ChainId::Solana)
    }

    /// Builder: make `connect` fail
    pub fn with_connect_error(self, err: WalletError) -> Self {
        self.script.lock().unwrap().connect_result = Err(err);
        self
    }

    /// Builder: answers for successive `switch_chain` calls (default `Ok`)
    pub fn with_switch_results(self, results: Vec<Result<(), WalletError>>) -> Self {
        self.script.lock().unwrap().switch_results = results.into();
        self
    }

    pub fn with_add_chain_result(self, result: Result<(), WalletError>) -> Self {
        self.script.lock().unwrap().add_chain_result = result;
        self
    }

    pub fn with_sign_result(self, result: Result<Vec<u8>, WalletError>) -> Self {
        self.script.lock().unwrap().sign_result = result;
        self
    }

    pub fn with_balance(self, result: Result<Decimal, WalletError>) -> Self {
        self.script.lock().unwrap().balance_result = result;
        self
    }

    /// Builder: wallet name reported by `name()`
    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Builder: `connect` waits until [`ScriptedWallet::release_connect`]
    pub fn with_held_connect(self) -> Self {
        self.script.lock().unwrap().hold_connect = true;
        self
    }

    pub fn release_connect(&self) {
        self.connect_gate.notify_one();
    }

    pub fn calls(&self) -> Vec<WalletCall> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count_calls(&self, pred: impl Fn(&WalletCall) -> bool) -> usize {
        self.calls().iter().filter(|c| pred(c)).count()
    }

    /// Push a notification to every subscriber
    pub fn emit(&self, notification: ProviderNotification) {
        self.notifiers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(notification.clone()).is_ok());
    }

    /// End every notification stream, as a crashed extension would
    pub fn drop_notifications(&self) {
        self.notifiers.lock().unwrap().clear();
    }

    pub fn subscriber_count(&self) -> usize {
        self.notifiers
            .lock()
            .unwrap()
            .iter()
            .filter(|tx| !tx.is_closed())
            .count()
    }

    fn record(&self, call: WalletCall) {
        self.script.lock().unwrap().calls.push(call);
    }
}

#[async_trait]
impl WalletProvider for ScriptedWallet {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&self) -> Result<WalletConnection, WalletError> {
        self.record(WalletCall::Connect);
        let hold = self.script.lock().unwrap().hold_connect;
        if hold {
            self.connect_gate.notified().await;
        }
        self.script.lock().unwrap().connect_result.clone()
    }

    async fn disconnect(&self) -> Result<(), WalletError> {
        self.record(WalletCall::Disconnect);
        Ok(())
    }

    async fn get_address(&self) -> Result<String, WalletError> {
        self.script
            .lock()
            .unwrap()
            .connect_result
            .as_ref()
            .map(|c| c.address.clone())
            .map_err(Clone::clone)
    }

    async fn get_chain_id(&self) -> Result<ChainId, WalletError> {
        Ok(self.script.lock().unwrap().chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        self.record(WalletCall::SwitchChain(chain_id));
        let mut script = self.script.lock().unwrap();
        let result = script.switch_results.pop_front().unwrap_or(Ok(()));
        if result.is_ok() {
            script.chain_id = ChainId::Evm(chain_id);
        }
        result
    }

    async fn add_chain(&self, chain: &ChainDescriptor) -> Result<(), WalletError> {
        self.record(WalletCall::AddChain(chain.chain_id));
        self.script.lock().unwrap().add_chain_result.clone()
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Vec<u8>, WalletError> {
        self.record(WalletCall::SignMessage(message.to_vec()));
        self.script.lock().unwrap().sign_result.clone()
    }

    async fn get_balance(&self) -> Result<Decimal, WalletError> {
        self.record(WalletCall::GetBalance);
        self.script.lock().unwrap().balance_result.clone()
    }

    fn notifications(&self) -> NotificationStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.notifiers.lock().unwrap().push(tx);
        Box::pin(stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|n| (n, rx))
        }))
    }
}

// ============================================================================
// Swap backend
// ============================================================================

type QuoteReply = Result<QuotePayload, ApiError>;

#[derive(Default)]
struct ApiScript {
    quote_reply: Option<QuoteReply>,
    swap_reply: Option<Result<SwapSubmission, ApiError>>,
    chains: Vec<RemoteChain>,
    transactions: Vec<TransactionRecord>,
    gated: bool,
    gates: Vec<Option<oneshot::Sender<QuoteReply>>>,
    quote_requests: Vec<SwapRequest>,
    swap_requests: Vec<SwapRequest>,
}

/// Swap backend with scripted replies and optionally gated quotes.
///
/// In gated mode every `quote` call parks until the test resolves it by index
/// with [`MockSwapApi::resolve_quote`], which makes completion order fully
/// controllable.
#[derive(Clone, Default)]
pub struct MockSwapApi {
    script: Arc<Mutex<ApiScript>>,
}

impl MockSwapApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quote(self, payload: QuotePayload) -> Self {
        self.script.lock().unwrap().quote_reply = Some(Ok(payload));
        self
    }

    pub fn with_quote_error(self, err: ApiError) -> Self {
        self.script.lock().unwrap().quote_reply = Some(Err(err));
        self
    }

    pub fn with_swap(self, transaction_id: &str) -> Self {
        self.script.lock().unwrap().swap_reply = Some(Ok(SwapSubmission {
            transaction_id: transaction_id.to_string(),
            status: Some("pending".to_string()),
            tx_hash: None,
        }));
        self
    }

    pub fn with_swap_error(self, err: ApiError) -> Self {
        self.script.lock().unwrap().swap_reply = Some(Err(err));
        self
    }

    pub fn with_chains(self, chains: Vec<RemoteChain>) -> Self {
        self.script.lock().unwrap().chains = chains;
        self
    }

    pub fn with_transactions(self, records: Vec<TransactionRecord>) -> Self {
        self.script.lock().unwrap().transactions = records;
        self
    }

    pub fn set_transactions(&self, records: Vec<TransactionRecord>) {
        self.script.lock().unwrap().transactions = records;
    }

    /// Builder: park every quote call until resolved
    pub fn gated(self) -> Self {
        self.script.lock().unwrap().gated = true;
        self
    }

    /// Complete the `index`-th gated quote call. Returns false if it was
    /// already resolved or never issued.
    pub fn resolve_quote(&self, index: usize, reply: QuoteReply) -> bool {
        let gate = self
            .script
            .lock()
            .unwrap()
            .gates
            .get_mut(index)
            .and_then(Option::take);
        match gate {
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    pub fn quote_requests(&self) -> Vec<SwapRequest> {
        self.script.lock().unwrap().quote_requests.clone()
    }

    pub fn swap_requests(&self) -> Vec<SwapRequest> {
        self.script.lock().unwrap().swap_requests.clone()
    }
}

/// Quote payload helper for tests
pub fn quote_payload(to_amount: &str, execution_time: u64, price_impact: f64) -> QuotePayload {
    QuotePayload {
        to_amount: to_amount.to_string(),
        execution_time,
        price_impact,
        bridge_fees: None,
        id: None,
        expires_in: None,
    }
}

#[async_trait]
impl SwapApiPort for MockSwapApi {
    async fn quote(&self, request: &SwapRequest) -> Result<QuotePayload, ApiError> {
        let gate = {
            let mut script = self.script.lock().unwrap();
            script.quote_requests.push(request.clone());
            if script.gated {
                let (tx, rx) = oneshot::channel();
                script.gates.push(Some(tx));
                Some(rx)
            } else {
                None
            }
        };

        match gate {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ApiError::Network("gate dropped".to_string()))),
            None => self
                .script
                .lock()
                .unwrap()
                .quote_reply
                .clone()
                .unwrap_or_else(|| Err(ApiError::Network("no quote configured".to_string()))),
        }
    }

    async fn swap(&self, request: &SwapRequest) -> Result<SwapSubmission, ApiError> {
        let mut script = self.script.lock().unwrap();
        script.swap_requests.push(request.clone());
        script
            .swap_reply
            .clone()
            .unwrap_or_else(|| Err(ApiError::Network("no swap configured".to_string())))
    }

    async fn chains(&self) -> Result<Vec<RemoteChain>, ApiError> {
        Ok(self.script.lock().unwrap().chains.clone())
    }

    async fn transactions(&self, _address: &str) -> Result<Vec<TransactionRecord>, ApiError> {
        Ok(self.script.lock().unwrap().transactions.clone())
    }
}

// ============================================================================
// Push transport
// ============================================================================

type ServerFrame = Result<String, TransportError>;

#[derive(Default)]
struct TransportScript {
    attempts: usize,
    failures_remaining: usize,
    live: Option<mpsc::UnboundedSender<ServerFrame>>,
    sent: Vec<String>,
    open_connections: usize,
}

/// In-memory push transport. The test plays the server side.
#[derive(Clone, Default)]
pub struct MockTransport {
    script: Arc<Mutex<TransportScript>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: the next `n` connect attempts fail
    pub fn failing_first(self, n: usize) -> Self {
        self.script.lock().unwrap().failures_remaining = n;
        self
    }

    pub fn fail_next_connects(&self, n: usize) {
        self.script.lock().unwrap().failures_remaining = n;
    }

    pub fn connect_attempts(&self) -> usize {
        self.script.lock().unwrap().attempts
    }

    /// Connections opened and not yet dropped by the client
    pub fn open_connections(&self) -> usize {
        self.script.lock().unwrap().open_connections
    }

    /// Every frame the client sent, across all connections
    pub fn sent(&self) -> Vec<String> {
        self.script.lock().unwrap().sent.clone()
    }

    /// Deliver a text frame on the live connection
    pub fn push(&self, text: &str) -> bool {
        match &self.script.lock().unwrap().live {
            Some(tx) => tx.send(Ok(text.to_string())).is_ok(),
            None => false,
        }
    }

    /// Close the live connection from the server side
    pub fn close_live(&self) {
        self.script.lock().unwrap().live = None;
    }

    /// Fail the live connection with a receive error
    pub fn fault_live(&self) {
        if let Some(tx) = self.script.lock().unwrap().live.take() {
            let _ = tx.send(Err(TransportError::Receive("connection reset".to_string())));
        }
    }
}

#[async_trait]
impl RealtimeTransport for MockTransport {
    fn endpoint(&self) -> &str {
        "ws://mock/api/ws"
    }

    async fn connect(&self) -> Result<Box<dyn RealtimeConnection>, TransportError> {
        let mut script = self.script.lock().unwrap();
        script.attempts += 1;
        if script.failures_remaining > 0 {
            script.failures_remaining -= 1;
            return Err(TransportError::Connect("connection refused".to_string()));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        script.live = Some(tx);
        script.open_connections += 1;
        Ok(Box::new(MockConnection {
            inbound: rx,
            script: Arc::clone(&self.script),
        }))
    }
}

struct MockConnection {
    inbound: mpsc::UnboundedReceiver<ServerFrame>,
    script: Arc<Mutex<TransportScript>>,
}

#[async_trait]
impl RealtimeConnection for MockConnection {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.script.lock().unwrap().sent.push(text);
        Ok(())
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

impl Drop for MockConnection {
    fn drop(&mut self) {
        if let Ok(mut script) = self.script.lock() {
            script.open_connections = script.open_connections.saturating_sub(1);
        }
    }
}
