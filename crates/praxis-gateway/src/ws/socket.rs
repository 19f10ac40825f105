//! Per-connection state and the master websocket loops.
//!
//! Each connection runs a fixed set of long-lived tasks under one
//! cancellation root: the main loop (heartbeat, outbound fan-in, inbound
//! dispatch), a reader, and — for authenticated callers — a user poller
//! that occupies one slot of the bounded worker pool. Handler and plugin
//! dispatches share the remaining slots.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{close_code, CloseFrame, Message as WsMessage, WebSocket};
use futures::stream::{SplitSink, SplitStream};
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;

use praxis_store::User;

use super::message::{parse_envelope, Message, MessageType, ResponseCode};
use super::plugin::WebSocketPlugin;
use super::relay::AgentRelayPlugin;
use crate::state::GatewayState;

/// Per-frame read limit.
pub const MAX_FRAME_BYTES: usize = 1 << 18;

/// Server-originated ping cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Inbound frames buffered between the reader and the main loop. A full
/// channel blocks the reader, which throttles slow clients by design.
const INBOUND_CHANNEL_CAPACITY: usize = 100;

/// Worker pool per connection: four handler slots plus the user poller.
const WORKER_POOL_SIZE: u32 = 5;

/// Poll cadence while the client is actively interacting.
pub const USER_POLL_INTERVAL_HOT: Duration = Duration::from_secs(30);
/// Poll cadence for a recently active client.
pub const USER_POLL_INTERVAL_WARM: Duration = Duration::from_secs(3 * 60);
/// Poll cadence for an idle client.
pub const USER_POLL_INTERVAL_COLD: Duration = Duration::from_secs(15 * 60);

/// Inactivity bound below which polling stays hot.
pub const USER_POLL_THRESHOLD_HOT: Duration = Duration::from_secs(60);
/// Inactivity bound below which polling turns warm.
pub const USER_POLL_THRESHOLD_WARM: Duration = Duration::from_secs(15 * 60);
/// Inactivity bound at which polling turns cold.
pub const USER_POLL_THRESHOLD_COLD: Duration = Duration::from_secs(30 * 60);

/// Shared state of one master websocket connection.
pub struct MasterSocket {
    user: RwLock<Option<Arc<User>>>,
    last_interaction: RwLock<Instant>,
    cancel: CancellationToken,
    workers: Arc<Semaphore>,
    poll_tx: mpsc::Sender<()>,
    poll_ack: tokio::sync::Mutex<mpsc::Receiver<()>>,
}

/// The poller's ends of the manual-poll channels.
pub(crate) struct PollerChannels {
    poll_rx: mpsc::Receiver<()>,
    ack_tx: mpsc::Sender<()>,
}

impl MasterSocket {
    fn new(user: Option<Arc<User>>) -> (Arc<Self>, PollerChannels) {
        let (poll_tx, poll_rx) = mpsc::channel(1);
        let (ack_tx, ack_rx) = mpsc::channel(1);
        let socket = Arc::new(Self {
            user: RwLock::new(user),
            last_interaction: RwLock::new(Instant::now()),
            cancel: CancellationToken::new(),
            workers: Arc::new(Semaphore::new(WORKER_POOL_SIZE as usize)),
            poll_tx,
            poll_ack: tokio::sync::Mutex::new(ack_rx),
        });
        (socket, PollerChannels { poll_rx, ack_tx })
    }

    /// The latest snapshot of the authenticated user, if any.
    #[must_use]
    pub fn user(&self) -> Option<Arc<User>> {
        self.user.read().clone()
    }

    fn set_user(&self, user: Arc<User>) {
        *self.user.write() = Some(user);
    }

    /// Record a client-originated interaction.
    pub fn touch(&self) {
        *self.last_interaction.write() = Instant::now();
    }

    /// Time since the last client-originated message.
    #[must_use]
    pub fn since_last_interaction(&self) -> Duration {
        self.last_interaction.read().elapsed()
    }

    /// The connection's cancellation root.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Force a user poll and wait for the poller's acknowledgement. The
    /// acknowledgement read is mandatory; skipping it would block the
    /// poller on its unbuffered response channel.
    pub async fn poll_user(&self) {
        if self.poll_tx.send(()).await.is_err() {
            return;
        }
        let mut ack = self.poll_ack.lock().await;
        let _ = ack.recv().await;
    }
}

/// A registered message handler.
pub type WebSocketHandler = Arc<
    dyn Fn(Arc<MasterSocket>, Message, mpsc::Sender<Message>) -> futures::future::BoxFuture<'static, ()>
        + Send
        + Sync,
>;

/// Handlers keyed by message type. Unlike plugins, at most one handler runs
/// per message.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<MessageType, WebSocketHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the handler for a message type, replacing any previous one.
    pub fn register(&mut self, message_type: MessageType, handler: WebSocketHandler) {
        self.handlers.insert(message_type, handler);
    }

    fn get(&self, message_type: MessageType) -> Option<&WebSocketHandler> {
        self.handlers.get(&message_type)
    }
}

/// Drive one upgraded connection to completion.
///
/// The caller must already have validated the origin. The connection's
/// lifetime is independent of the HTTP request that upgraded it.
pub async fn run_master_socket(
    state: Arc<GatewayState>,
    socket: WebSocket,
    user: Option<Arc<User>>,
    handlers: HandlerRegistry,
) {
    let authenticated = user.is_some();
    let (master, poller_channels) = MasterSocket::new(user);
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Message>(1);
    let (inbound_tx, inbound_rx) = mpsc::channel::<Message>(INBOUND_CHANNEL_CAPACITY);
    let (write, read) = socket.split();

    tracing::info!(authenticated, "new master websocket connection");

    tokio::spawn(reader_loop(
        master.clone(),
        read,
        inbound_tx,
        outgoing_tx.clone(),
    ));

    if authenticated {
        let permit = master.workers.clone().acquire_owned().await.ok();
        tokio::spawn(poller_loop(
            state.clone(),
            master.clone(),
            poller_channels,
            permit,
        ));
    }

    let relay: Arc<dyn WebSocketPlugin> = Arc::new(AgentRelayPlugin::new(
        state,
        master.clone(),
        outgoing_tx.clone(),
    ));
    let plugins = vec![relay];

    main_loop(
        master, write, plugins, handlers, outgoing_rx, inbound_rx, outgoing_tx,
    )
    .await;
}

async fn main_loop(
    master: Arc<MasterSocket>,
    mut write: SplitSink<WebSocket, WsMessage>,
    plugins: Vec<Arc<dyn WebSocketPlugin>>,
    handlers: HandlerRegistry,
    mut outgoing_rx: mpsc::Receiver<Message>,
    mut inbound_rx: mpsc::Receiver<Message>,
    outgoing_tx: mpsc::Sender<Message>,
) {
    let mut heartbeat = tokio::time::interval_at(
        tokio::time::Instant::now() + HEARTBEAT_INTERVAL,
        HEARTBEAT_INTERVAL,
    );

    loop {
        tokio::select! {
            () = master.cancel.cancelled() => break,
            _ = heartbeat.tick() => {
                if let Err(e) = write.send(WsMessage::Ping(Vec::new())).await {
                    tracing::error!(error = %e, "failed to send ping to client");
                    break;
                }
            }
            Some(message) = outgoing_rx.recv() => {
                match serde_json::to_string(&message) {
                    Ok(text) => {
                        if let Err(e) = write.send(WsMessage::Text(text)).await {
                            tracing::error!(error = %e, "failed to forward message to client");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to encode outbound message"),
                }
            }
            Some(message) = inbound_rx.recv() => {
                for plugin in &plugins {
                    let plugin = plugin.clone();
                    let message = message.clone();
                    let sequence_id = message.sequence_id.clone();
                    dispatch(&master, outgoing_tx.clone(), sequence_id, async move {
                        plugin.handle_message(&message).await;
                    });
                }

                if let Some(handler) = handlers.get(message.message_type) {
                    let future = handler(master.clone(), message.clone(), outgoing_tx.clone());
                    dispatch(&master, outgoing_tx.clone(), message.sequence_id.clone(), future);
                }
            }
            else => break,
        }
    }

    // Shutdown: cancel everything, give plugins their teardown, close the
    // socket, and wait for the pool to drain.
    master.cancel.cancel();
    for plugin in &plugins {
        plugin.close().await;
    }
    let _ = write
        .send(WsMessage::Close(Some(CloseFrame {
            code: close_code::NORMAL,
            reason: "".into(),
        })))
        .await;
    let _ = master.workers.acquire_many(WORKER_POOL_SIZE).await;
    tracing::debug!("master websocket closed");
}

/// Send a frame to the outbound fan-in unless the connection is shutting
/// down. Racing the cancellation keeps senders from wedging on the channel
/// once the main loop has stopped draining it.
pub(crate) async fn send_until_cancelled(
    cancel: &CancellationToken,
    outgoing: &mpsc::Sender<Message>,
    message: Message,
) -> bool {
    tokio::select! {
        () = cancel.cancelled() => false,
        result = outgoing.send(message) => result.is_ok(),
    }
}

/// Run one handler dispatch on the worker pool, converting a panic into a
/// `GenericError` addressed to the originating sequence ID.
fn dispatch(
    master: &Arc<MasterSocket>,
    outgoing: mpsc::Sender<Message>,
    sequence_id: String,
    task: impl Future<Output = ()> + Send + 'static,
) {
    let workers = master.workers.clone();
    let cancel = master.cancel.clone();
    tokio::spawn(async move {
        let Ok(_permit) = workers.acquire_owned().await else {
            return;
        };
        if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
            tracing::error!(
                sequence_id = %sequence_id,
                panic = %panic_message(panic.as_ref()),
                "unexpected panic in websocket handler",
            );
            send_until_cancelled(
                &cancel,
                &outgoing,
                Message::generic_error(
                    &sequence_id,
                    ResponseCode::ServerError,
                    "internal server error occurred",
                ),
            )
            .await;
        }
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn reader_loop(
    master: Arc<MasterSocket>,
    mut read: SplitStream<WebSocket>,
    inbound: mpsc::Sender<Message>,
    outgoing: mpsc::Sender<Message>,
) {
    loop {
        let frame = tokio::select! {
            () = master.cancel.cancelled() => break,
            frame = read.next() => frame,
        };

        let Some(Ok(frame)) = frame else {
            tracing::debug!("websocket closed");
            break;
        };

        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => break,
            },
            WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
            WsMessage::Close(_) => {
                tracing::debug!("websocket closed");
                break;
            }
        };

        // Unparsable frames are read errors; an invalid envelope inside
        // valid JSON gets a ValidationError and the connection stays open.
        let Ok(raw) = serde_json::from_str::<serde_json::Value>(&text) else {
            break;
        };
        match parse_envelope(&raw) {
            Ok(message) => {
                master.touch();
                if inbound.send(message).await.is_err() {
                    break;
                }
            }
            Err(rejection) => {
                tracing::debug!(
                    sequence_id = %rejection.sequence_id,
                    "websocket envelope validation failed",
                );
                send_until_cancelled(&master.cancel, &outgoing, rejection.into_message()).await;
            }
        }
    }
    master.cancel.cancel();
}

/// Pick the poll interval for the current inactivity span.
///
/// Between the warm and cold thresholds no branch matches and the previous
/// interval persists (hysteresis). A manual poll always forces hot.
pub(crate) fn next_interval(manual: bool, since_last_interaction: Duration, current: Duration) -> Duration {
    if manual || since_last_interaction < USER_POLL_THRESHOLD_HOT {
        USER_POLL_INTERVAL_HOT
    } else if since_last_interaction < USER_POLL_THRESHOLD_WARM {
        USER_POLL_INTERVAL_WARM
    } else if since_last_interaction >= USER_POLL_THRESHOLD_COLD {
        USER_POLL_INTERVAL_COLD
    } else {
        current
    }
}

async fn poller_loop(
    state: Arc<GatewayState>,
    master: Arc<MasterSocket>,
    channels: PollerChannels,
    _permit: Option<OwnedSemaphorePermit>,
) {
    let PollerChannels {
        mut poll_rx,
        ack_tx,
    } = channels;

    let mut interval = USER_POLL_INTERVAL_HOT;
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
    let mut last_poll = Instant::now();

    loop {
        let manual = tokio::select! {
            () = master.cancel.cancelled() => return,
            _ = ticker.tick() => false,
            Some(()) = poll_rx.recv() => true,
        };

        let next = next_interval(manual, master.since_last_interaction(), interval);
        if next != interval {
            interval = next;
            ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        }

        // Skip if we already polled within the interval; the one-second
        // slack absorbs timer jitter.
        if last_poll.elapsed() + Duration::from_secs(1) < interval {
            if manual {
                let _ = ack_tx.send(()).await;
            }
            continue;
        }

        if let Some(current) = master.user() {
            match state.store.user_by_id(current.id).await {
                Ok(Some(fresh)) => {
                    master.set_user(Arc::new(fresh));
                    last_poll = Instant::now();
                }
                Ok(None) => {
                    tracing::error!(user_id = %current.id, "user poller found no user record");
                }
                Err(e) => {
                    tracing::error!(user_id = %current.id, error = %e, "user poller query failed");
                }
            }
        }

        if manual {
            let _ = ack_tx.send(()).await;
        }
    }
}
