use crate::error::{ConnectorError, Result};
use crate::types::{ClientEvent, CloseInfo, ConnectionState, EventKind, InboundMessage, OutboundMessage};
use crate::websocket::config::ConnectionConfig;
use crate::websocket::listeners::{Listener, ListenerRegistry};
use crate::websocket::transport::{
    Channel, ConnectRequest, Connector, Frame, FrameSink, FrameStream, TungsteniteConnector,
};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use log::*;
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt::Display;
use std::future::{pending, Future};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, sleep, Duration, Instant, Interval, MissedTickBehavior, Sleep};
use uuid::Uuid;

const NORMAL_CLOSURE: u16 = 1000; // Close code used when disconnect() is given none

enum Command {
    Connect,
    Disconnect {
        code: Option<u16>,
        reason: Option<String>,
    },
    Send(OutboundMessage),
    Destroy,
}

/// A WebSocket client that reconnects on its own, keeps the link alive with a
/// heartbeat and buffers outbound messages while disconnected.
///
/// The handle is cheap to call from anywhere: every operation is a command for a
/// background driver task that owns the connection. Nothing here returns an error
/// once the client is built; failures are delivered to `error` listeners.
///
/// Requires a running Tokio runtime.
///
/// # Examples
///
/// ```no_run
/// use resilient_connector_rs::types::{ClientEvent, EventKind};
/// use resilient_connector_rs::websocket::{ConnectionConfig, WebsocketClient};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() {
///     let mut config = ConnectionConfig::new("ws://localhost:8080");
///     config.reconnect_interval_ms = 3_000;
///     config.max_reconnect_attempts = Some(10);
///
///     let client = WebsocketClient::new(config).expect("Invalid config");
///     client.on(
///         EventKind::Message,
///         Arc::new(|event: &ClientEvent| println!("Received: {:?}", event)),
///     );
///
///     client.connect();
///     // Queued until the connection is open.
///     client.send(json!({"type": "chat", "message": "Hello"}));
///
///     tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
///     client.destroy();
/// }
/// ```
pub struct WebsocketClient {
    tag: String,
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionState>,
    reconnect_attempts: Arc<AtomicU32>,
    listeners: Arc<ListenerRegistry>,
    destroyed: AtomicBool,
}

impl WebsocketClient {
    /// Creates a client using the default `tokio-tungstenite` transport.
    /// The client stays `Idle` until [`connect`](Self::connect) is called.
    pub fn new(config: ConnectionConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Creates a client with a custom transport.
    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        let url = config.validate()?;
        let tag = Uuid::new_v4().to_string()[..8].to_string();

        // Channel for handle -> driver commands
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (status_tx, status) = watch::channel(ConnectionState::Idle);
        let reconnect_attempts = Arc::new(AtomicU32::new(0));
        let listeners = Arc::new(ListenerRegistry::new());

        let driver = Driver {
            tag: tag.clone(),
            request: ConnectRequest {
                url,
                protocols: config.protocols.clone(),
            },
            config,
            connector,
            listeners: Arc::clone(&listeners),
            status: status_tx,
            shared_attempts: Arc::clone(&reconnect_attempts),
            reconnect_attempts: 0,
            queue: VecDeque::new(),
            manual_close: false,
            abandoned: false,
            pending_connect: None,
            sink: None,
            stream: None,
            connection_timer: None,
            reconnect_timer: None,
            heartbeat_timer: None,
        };
        // The driver owns the connection from here on
        tokio::spawn(driver.run(command_rx));

        Ok(Self {
            tag,
            commands,
            status,
            reconnect_attempts,
            listeners,
            destroyed: AtomicBool::new(false),
        })
    }

    /// Opens the connection. Ignored while already open.
    pub fn connect(&self) {
        self.dispatch(Command::Connect);
    }

    /// Closes the connection on purpose: no automatic reconnect follows.
    /// `code` defaults to 1000 (normal closure).
    pub fn disconnect(&self, code: Option<u16>, reason: Option<&str>) {
        self.dispatch(Command::Disconnect {
            code,
            reason: reason.map(str::to_string),
        });
    }

    /// Sends now if open, queues otherwise. After reconnection has been abandoned the
    /// message is dropped and an `error` event is emitted instead.
    pub fn send(&self, message: impl Into<OutboundMessage>) {
        self.dispatch(Command::Send(message.into()));
    }

    /// Serializes `value` as JSON and sends it.
    pub fn send_json<T: Serialize>(&self, value: &T) {
        match serde_json::to_value(value) {
            Ok(value) => self.send(OutboundMessage::Json(value)),
            Err(e) => {
                if !self.is_destroyed() {
                    error!("[{}] Failed to serialize outbound message: {}", self.tag, e);
                    self.listeners.emit(&ClientEvent::Error(e.into()));
                }
            }
        }
    }

    /// Registers a listener. Registering the same `Arc` twice has no effect.
    pub fn on(&self, kind: EventKind, listener: Listener) {
        if self.is_destroyed() {
            return;
        }
        if !self.listeners.add(kind, listener) {
            trace!("[{}] Listener already registered for {:?}", self.tag, kind);
        }
    }

    pub fn off(&self, kind: EventKind, listener: &Listener) {
        self.listeners.remove(kind, listener);
    }

    pub fn status(&self) -> ConnectionState {
        *self.status.borrow()
    }

    /// Reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Waits until the client reports `target`.
    ///
    /// Only the latest state is observed, so a state the client passes through
    /// quickly (e.g. `Closed` between two reconnect attempts) can be missed.
    pub async fn wait_for_status(&self, target: ConnectionState, timeout: Duration) -> Result<()> {
        let mut status = self.status.clone();
        // Bind the outcome first: the watch guard must not outlive `status`.
        let outcome = tokio::time::timeout(timeout, status.wait_for(|state| *state == target))
            .await
            .map(|reached| reached.map(|_| ()));
        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(ConnectorError::ClientDestroyed),
            Err(_) => Err(ConnectorError::Timeout(format!(
                "client did not reach '{}' within {:?} (currently '{}')",
                target,
                timeout,
                self.status()
            ))),
        }
    }

    /// Disconnects, drops queued messages and all listeners, and stops the driver.
    /// Every later call on this client is a no-op.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.listeners.clear();
        if self.commands.send(Command::Destroy).is_err() {
            debug!("[{}] Driver already stopped", self.tag);
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn dispatch(&self, command: Command) {
        if self.is_destroyed() {
            trace!("[{}] Ignoring call on destroyed client", self.tag);
            return;
        }
        if self.commands.send(command).is_err() {
            debug!("[{}] Driver stopped, command dropped", self.tag);
        }
    }
}

// --- Driver Task ---

/// Owns all connection state. Runs until the client is destroyed or dropped.
struct Driver {
    tag: String,
    config: ConnectionConfig,
    request: ConnectRequest,
    connector: Arc<dyn Connector>,
    listeners: Arc<ListenerRegistry>,
    status: watch::Sender<ConnectionState>,
    shared_attempts: Arc<AtomicU32>,
    reconnect_attempts: u32,
    queue: VecDeque<OutboundMessage>,
    manual_close: bool,
    abandoned: bool,
    pending_connect: Option<BoxFuture<'static, Result<Channel>>>,
    sink: Option<FrameSink>,
    stream: Option<FrameStream>,
    // At most one timer of each kind; assigning replaces (and cancels) the old one.
    connection_timer: Option<Pin<Box<Sleep>>>,
    reconnect_timer: Option<Pin<Box<Sleep>>>,
    heartbeat_timer: Option<Interval>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                // Calls made on the handle
                command = commands.recv() => match command {
                    Some(Command::Connect) => self.connect(),
                    Some(Command::Disconnect { code, reason }) => self.disconnect(code, reason).await,
                    Some(Command::Send(message)) => self.send(message).await,
                    Some(Command::Destroy) | None => break, // Destroyed or handle dropped
                },
                // Handshake finished (either way)
                outcome = poll_slot(&mut self.pending_connect) => {
                    self.pending_connect = None;
                    match outcome {
                        Ok(channel) => self.handle_open(channel).await,
                        Err(e) => self.handle_connect_failure(e),
                    }
                }
                // Handshake took too long
                _ = poll_slot(&mut self.connection_timer) => {
                    self.connection_timer = None;
                    self.handle_connect_timeout();
                }
                // Reconnect delay elapsed
                _ = poll_slot(&mut self.reconnect_timer) => {
                    self.reconnect_timer = None;
                    let attempt = self.reconnect_attempts;
                    self.emit(ClientEvent::Reconnect { attempt });
                    self.connect();
                }
                // Keep-alive
                _ = next_tick(&mut self.heartbeat_timer) => self.send_heartbeat().await,
                // Inbound traffic
                frame = next_frame(&mut self.stream) => self.handle_frame(frame).await,
            }
        }

        // --- Shutdown ---
        self.disconnect(None, None).await;
        self.queue.clear();
        self.lifecycle("Driver stopped, client destroyed");
    }

    fn connect(&mut self) {
        if self.state() == ConnectionState::Open {
            self.lifecycle("Already connected, ignoring connect()");
            return;
        }

        self.manual_close = false;
        self.abandoned = false;
        // Drop any old transport and pending retry before starting over
        self.reconnect_timer = None;
        self.sink = None;
        self.stream = None;

        self.lifecycle(format!("Connecting to {}...", self.request.url));
        self.set_state(ConnectionState::Connecting);
        self.pending_connect = Some(self.connector.connect(self.request.clone()));
        self.connection_timer = Some(Box::pin(sleep(self.config.connection_timeout())));
    }

    async fn disconnect(&mut self, code: Option<u16>, reason: Option<String>) {
        self.manual_close = true;
        self.clear_timers();

        let was_connecting = self.pending_connect.take().is_some();
        let sink = self.sink.take();
        self.stream = None;
        if sink.is_none() && !was_connecting {
            self.lifecycle("disconnect() without an active connection");
            return;
        }

        self.lifecycle("Closing connection on request");
        self.set_state(ConnectionState::Closing);
        let reason = reason.unwrap_or_default();
        if let Some(mut sink) = sink {
            let frame = Frame::Close(Some((code.unwrap_or(NORMAL_CLOSURE), reason.clone())));
            if let Err(e) = sink.send(frame).await {
                debug!("[{}] Close frame not delivered: {}", self.tag, e);
            }
        }

        self.handle_close(CloseInfo {
            code,
            reason,
            manual: true,
        });
    }

    async fn send(&mut self, message: OutboundMessage) {
        if let Some(sink) = self.sink.as_mut() {
            let frame = match Frame::encode(message) {
                Ok(frame) => frame,
                Err(e) => {
                    error!("[{}] Failed to encode outbound message: {}", self.tag, e);
                    self.emit(ClientEvent::Error(e));
                    return;
                }
            };
            match sink.send(frame).await {
                Ok(()) => trace!("[{}] Message sent", self.tag),
                Err(e) => {
                    error!("[{}] WebSocket send error: {}", self.tag, e);
                    self.emit(ClientEvent::Error(ConnectorError::SendFailure(e.to_string())));
                }
            }
        } else if self.abandoned {
            warn!(
                "[{}] Reconnection abandoned, dropping outbound message",
                self.tag
            );
            self.emit(ClientEvent::Error(ConnectorError::ReconnectExhausted {
                attempts: self.reconnect_attempts,
            }));
        } else {
            debug!("[{}] Not connected, message queued", self.tag);
            self.queue.push_back(message);
        }
    }

    async fn handle_open(&mut self, channel: Channel) {
        self.connection_timer = None;
        self.set_attempts(0);
        self.sink = Some(channel.sink);
        self.stream = Some(channel.stream);
        self.set_state(ConnectionState::Open);
        self.lifecycle("WebSocket connection established");

        self.flush_queue().await;
        self.start_heartbeat();
        self.emit(ClientEvent::Open);
    }

    fn handle_connect_failure(&mut self, err: ConnectorError) {
        self.connection_timer = None;
        warn!("[{}] Failed to establish connection: {}", self.tag, err);
        let reason = err.to_string();
        self.emit(ClientEvent::Error(err));
        self.handle_close(CloseInfo {
            code: None,
            reason,
            manual: false,
        });
    }

    fn handle_connect_timeout(&mut self) {
        // Dropping the pending future aborts the handshake.
        self.pending_connect = None;
        let timeout = self.config.connection_timeout();
        warn!("[{}] Connection attempt timed out after {:?}", self.tag, timeout);
        self.emit(ClientEvent::Error(ConnectorError::ConnectionTimeout(timeout)));
        self.handle_close(CloseInfo {
            code: None,
            reason: "connection timeout".to_string(),
            manual: false,
        });
    }

    async fn handle_frame(&mut self, frame: Option<Result<Frame>>) {
        match frame {
            Some(Ok(Frame::Text(text))) => {
                trace!("[{}] Received WS Text: {}", self.tag, text);
                self.emit(ClientEvent::Message(InboundMessage::from_text(text)));
            }
            Some(Ok(Frame::Binary(bytes))) => {
                trace!("[{}] Received WS Binary ({} bytes)", self.tag, bytes.len());
                self.emit(ClientEvent::Message(InboundMessage::Binary(bytes)));
            }
            Some(Ok(Frame::Ping(data))) => {
                trace!("[{}] Received WS Ping, sending Pong", self.tag);
                if let Some(sink) = self.sink.as_mut() {
                    if let Err(e) = sink.send(Frame::Pong(data)).await {
                        warn!("[{}] Failed to send Pong: {}", self.tag, e);
                    }
                }
            }
            Some(Ok(Frame::Pong(_))) => {
                trace!("[{}] Received WS Pong", self.tag);
            }
            Some(Ok(Frame::Close(close))) => {
                let (code, reason) = match close {
                    Some((code, reason)) => (Some(code), reason),
                    None => (None, String::new()),
                };
                warn!("[{}] Received WS Close frame: {:?} {}", self.tag, code, reason);
                // Flush the close reply so the peer sees a completed handshake
                if let Some(mut sink) = self.sink.take() {
                    if let Err(e) = sink.close().await {
                        debug!("[{}] Close reply not delivered: {}", self.tag, e);
                    }
                }
                self.handle_close(CloseInfo {
                    code,
                    reason,
                    manual: false,
                });
            }
            Some(Err(e)) => {
                error!("[{}] WebSocket read error: {}", self.tag, e);
                let reason = e.to_string();
                self.emit(ClientEvent::Error(e));
                self.handle_close(CloseInfo {
                    code: None,
                    reason,
                    manual: false,
                });
            }
            None => {
                warn!("[{}] WebSocket stream ended", self.tag);
                self.handle_close(CloseInfo {
                    code: None,
                    reason: "connection lost".to_string(),
                    manual: false,
                });
            }
        }
    }

    fn handle_close(&mut self, info: CloseInfo) {
        // Drop the transport and stop the heartbeat
        self.sink = None;
        self.stream = None;
        self.heartbeat_timer = None;
        self.set_state(ConnectionState::Closed);
        self.lifecycle(format!(
            "WebSocket connection closed [code: {:?}, reason: {}]",
            info.code, info.reason
        ));

        let manual = info.manual;
        self.emit(ClientEvent::Close(info));
        // Only unrequested closes are retried
        if !manual && !self.manual_close {
            self.schedule_reconnect();
        }
    }

    fn schedule_reconnect(&mut self) {
        if !self.config.reconnect || self.manual_close {
            return;
        }

        // Give up once the limit is hit (None retries forever)

        if let Some(max) = self.config.max_reconnect_attempts {
            if self.reconnect_attempts >= max {
                error!(
                    "[{}] Max reconnect attempts ({}) reached. Stopping reconnection, dropping {} queued messages.",
                    self.tag,
                    max,
                    self.queue.len()
                );
                self.abandoned = true;
                self.queue.clear();
                self.set_state(ConnectionState::Abandoned);
                self.emit(ClientEvent::Error(ConnectorError::ReconnectExhausted {
                    attempts: self.reconnect_attempts,
                }));
                return;
            }
        }

        // Count the attempt now; the `reconnect` event fires when the timer does
        self.set_attempts(self.reconnect_attempts + 1);
        self.lifecycle(format!(
            "Reconnect attempt {} in {:?}",
            self.reconnect_attempts,
            self.config.reconnect_interval()
        ));
        self.reconnect_timer = Some(Box::pin(sleep(self.config.reconnect_interval()))); // Replaces any armed timer
    }

    async fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        self.lifecycle(format!("Flushing {} queued messages", self.queue.len()));
        let queued = std::mem::take(&mut self.queue);
        for message in queued {
            self.send(message).await;
        }
    }

    fn start_heartbeat(&mut self) {
        if !self.config.heartbeat {
            return;
        }
        let period = self.config.heartbeat_interval();
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.heartbeat_timer = Some(timer);
    }

    async fn send_heartbeat(&mut self) {
        if self.state() != ConnectionState::Open {
            return;
        }
        self.lifecycle("Sending heartbeat");
        let payload = self.config.heartbeat_payload();
        self.send(payload).await;
    }

    fn clear_timers(&mut self) {
        self.connection_timer = None;
        self.reconnect_timer = None;
        self.heartbeat_timer = None;
    }

    fn state(&self) -> ConnectionState {
        *self.status.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.status.send_replace(state);
    }

    fn set_attempts(&mut self, attempts: u32) {
        self.reconnect_attempts = attempts;
        self.shared_attempts.store(attempts, Ordering::SeqCst);
    }

    fn emit(&self, event: ClientEvent) {
        self.listeners.emit(&event);
    }

    fn lifecycle(&self, message: impl Display) {
        let level = if self.config.debug {
            Level::Info
        } else {
            Level::Debug
        };
        log!(level, "[{}] {}", self.tag, message);
    }
}

async fn poll_slot<F>(slot: &mut Option<F>) -> F::Output
where
    F: Future + Unpin,
{
    match slot {
        Some(fut) => fut.await,
        None => pending().await,
    }
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

async fn next_frame(stream: &mut Option<FrameStream>) -> Option<Result<Frame>> {
    match stream {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}
