//! Realtime Update Channel
//!
//! Keeps a push subscription alive for the current session address. On every
//! connect the channel sends `subscribe` for the address; on every exit from
//! `connected` exactly one reconnect timer is armed. Reconnection continues
//! with a fixed delay for as long as an address is known and stops once the
//! channel is stopped.
//!
//! Inbound events are decoded, recorded newest-first in a bounded history and
//! fanned out to listeners in arrival order.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::listeners::{Listener, ListenerId, ListenerRegistry};
use crate::ports::{parse_event, RealtimeEvent, RealtimeTransport, SubscribeMessage, TransportError};

pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Disconnected,
    Connecting,
    Connected,
    Erroring,
}

/// Snapshot of the channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    pub status: ChannelStatus,
    /// Most recent first
    pub last_updates: Vec<RealtimeEvent>,
}

#[derive(Debug, Clone)]
pub struct ChannelSettings {
    pub reconnect_delay: Duration,
    pub history_capacity: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

struct Core {
    status: ChannelStatus,
    address: Option<String>,
    history: VecDeque<RealtimeEvent>,
    /// Bumped on every connect attempt and on stop
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    connection: Option<JoinHandle<()>>,
    timer: Option<(u64, JoinHandle<()>)>,
    timer_seq: u64,
}

impl Core {
    fn cancel_timer(&mut self) {
        if let Some((_, timer)) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Inner {
    transport: Arc<dyn RealtimeTransport>,
    settings: ChannelSettings,
    core: Mutex<Core>,
    listeners: Arc<ListenerRegistry<RealtimeEvent>>,
}

#[derive(Clone)]
pub struct RealtimeChannel {
    inner: Arc<Inner>,
}

/// How a live connection ended
enum Exit {
    Closed,
    Fault(TransportError),
}

impl RealtimeChannel {
    pub fn new(transport: Arc<dyn RealtimeTransport>, settings: ChannelSettings) -> Self {
        Self {
            inner: Arc::new(Inner {
                transport,
                settings,
                core: Mutex::new(Core {
                    status: ChannelStatus::Disconnected,
                    address: None,
                    history: VecDeque::new(),
                    epoch: 0,
                    outbound: None,
                    connection: None,
                    timer: None,
                    timer_seq: 0,
                }),
                listeners: Arc::new(ListenerRegistry::new()),
            }),
        }
    }

    pub fn subscribe(&self, listener: Listener<RealtimeEvent>) -> ListenerId {
        self.inner.listeners.register(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.inner.listeners.unregister(id)
    }

    pub fn events(&self) -> (ListenerId, mpsc::UnboundedReceiver<RealtimeEvent>) {
        self.inner.listeners.channel()
    }

    pub fn state(&self) -> ChannelState {
        let core = self.inner.core.lock();
        ChannelState {
            status: core.status,
            last_updates: core.history.iter().cloned().collect(),
        }
    }

    pub fn status(&self) -> ChannelStatus {
        self.inner.core.lock().status
    }

    pub fn address(&self) -> Option<String> {
        self.inner.core.lock().address.clone()
    }

    /// Whether a reconnect timer is armed
    pub fn reconnect_pending(&self) -> bool {
        self.inner.core.lock().timer.is_some()
    }

    /// Start (or restart) the channel for `address`. Connects immediately,
    /// replacing any pending reconnect timer. Must run inside a tokio runtime.
    pub fn start(&self, address: &str) {
        let mut core = self.inner.core.lock();
        if core.address.as_deref() == Some(address)
            && matches!(core.status, ChannelStatus::Connecting | ChannelStatus::Connected)
        {
            return;
        }
        core.address = Some(address.to_string());
        if core.status == ChannelStatus::Connected {
            Inner::send_subscribe(&mut core, address);
            return;
        }
        connect_locked(&self.inner, &mut core);
    }

    /// Follow the session address: resubscribe on change, stop on `None`
    pub fn set_address(&self, address: Option<&str>) {
        match address {
            Some(address) => self.start(address),
            None => self.stop(),
        }
    }

    /// Tear down the connection and abandon reconnection
    pub fn stop(&self) {
        let mut core = self.inner.core.lock();
        core.address = None;
        core.epoch += 1;
        core.cancel_timer();
        core.outbound = None;
        if let Some(connection) = core.connection.take() {
            connection.abort();
        }
        if core.status != ChannelStatus::Disconnected {
            info!("Realtime channel stopped");
            core.status = ChannelStatus::Disconnected;
        }
    }
}

impl Inner {
    fn send_subscribe(core: &mut Core, address: &str) {
        let message = SubscribeMessage::new(address).to_json();
        if let Some(outbound) = &core.outbound {
            if outbound.send(message).is_err() {
                debug!("Connection task gone; subscribe will be sent on reconnect");
            }
        }
    }

    /// Record and fan out one inbound frame from connection `epoch`
    fn handle_frame(&self, epoch: u64, text: &str) {
        let event = match parse_event(text) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, frame = %truncate(text, 120), "Dropping malformed realtime payload");
                return;
            }
        };

        {
            let mut core = self.core.lock();
            if core.epoch != epoch {
                return;
            }
            core.history.push_front(event.clone());
            core.history.truncate(self.settings.history_capacity);
        }

        debug!(kind = event.kind(), "Realtime event");
        self.listeners.emit(&event);
    }

    /// Connection `epoch` ended
    fn connection_lost(self: &Arc<Self>, epoch: u64, exit: Exit) {
        let mut core = self.core.lock();
        if core.epoch != epoch {
            return;
        }
        core.outbound = None;
        core.connection = None;
        core.status = match exit {
            Exit::Closed => {
                info!("Realtime connection closed");
                ChannelStatus::Disconnected
            }
            Exit::Fault(e) => {
                warn!(error = %e, "Realtime transport fault");
                ChannelStatus::Erroring
            }
        };
        schedule_reconnect(self, &mut core);
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Begin a connect attempt, replacing any pending timer or live connection
fn connect_locked(inner: &Arc<Inner>, core: &mut Core) {
    core.cancel_timer();
    if let Some(connection) = core.connection.take() {
        connection.abort();
    }
    core.outbound = None;
    core.epoch += 1;
    core.status = ChannelStatus::Connecting;
    let epoch = core.epoch;
    debug!(endpoint = inner.transport.endpoint(), epoch, "Realtime connecting");
    core.connection = Some(tokio::spawn(run_connection(Arc::downgrade(inner), epoch)));
}

/// Arm the single reconnect timer, if an address is still known
fn schedule_reconnect(inner: &Arc<Inner>, core: &mut Core) {
    core.cancel_timer();
    if core.address.is_none() {
        debug!("No address; not reconnecting");
        core.status = ChannelStatus::Disconnected;
        return;
    }

    core.timer_seq += 1;
    let seq = core.timer_seq;
    let delay = inner.settings.reconnect_delay;
    let weak = Arc::downgrade(inner);
    debug!(?delay, "Reconnect scheduled");

    let handle = tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let Some(inner) = weak.upgrade() else {
            return;
        };
        let mut core = inner.core.lock();
        match core.timer.as_ref() {
            Some((armed, _)) if *armed == seq => {}
            _ => return,
        }
        // Forget our own handle so connect_locked does not abort this task
        core.timer = None;
        if core.address.is_some() {
            info!("Reconnecting realtime channel");
            connect_locked(&inner, &mut core);
        }
    });
    core.timer = Some((seq, handle));
}

async fn run_connection(inner: Weak<Inner>, epoch: u64) {
    let Some(transport) = inner.upgrade().map(|i| Arc::clone(&i.transport)) else {
        return;
    };

    let mut connection = match transport.connect().await {
        Ok(connection) => connection,
        Err(e) => {
            if let Some(inner) = inner.upgrade() {
                inner.connection_lost(epoch, Exit::Fault(e));
            }
            return;
        }
    };

    let (tx, mut outbound) = mpsc::unbounded_channel();
    {
        let Some(strong) = inner.upgrade() else {
            return;
        };
        let mut core = strong.core.lock();
        if core.epoch != epoch {
            return;
        }
        core.status = ChannelStatus::Connected;
        core.outbound = Some(tx);
        info!(endpoint = strong.transport.endpoint(), "Realtime channel connected");
        if let Some(address) = core.address.clone() {
            Inner::send_subscribe(&mut core, &address);
        }
    }

    let exit = loop {
        tokio::select! {
            Some(text) = outbound.recv() => {
                if let Err(e) = connection.send_text(text).await {
                    break Exit::Fault(e);
                }
            }
            frame = connection.next_text() => match frame {
                Some(Ok(text)) => match inner.upgrade() {
                    Some(inner) => inner.handle_frame(epoch, &text),
                    None => return,
                },
                Some(Err(e)) => break Exit::Fault(e),
                None => break Exit::Closed,
            },
        }
    };

    connection.close().await;
    if let Some(inner) = inner.upgrade() {
        inner.connection_lost(epoch, exit);
    }
}
