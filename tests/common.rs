// tests/common.rs
#![allow(dead_code)]

use futures_util::future::{self, BoxFuture};
use futures_util::Sink;
use resilient_connector_rs::error::{ConnectorError, Result};
use resilient_connector_rs::types::{ClientEvent, EventKind, InboundMessage};
use resilient_connector_rs::websocket::{
    Channel, ConnectRequest, Connector, Frame, Listener, WebsocketClient,
};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Once};
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Duration};

static INIT: Once = Once::new();

// Loads .env (if any) and initializes logging once across all tests.
pub fn setup() {
    INIT.call_once(|| {
        dotenv::dotenv().ok();
        env_logger::builder().is_test(true).try_init().ok();
    });
}

/// How the next connection attempt should behave.
pub enum Plan {
    Accept,
    Refuse,
    /// Never completes the handshake.
    Hang,
    /// Completes once the sender fires (or is dropped).
    Gate(oneshot::Receiver<()>),
}

/// The server's view of an accepted in-memory connection.
pub struct ServerSide {
    /// Frames written by the client.
    pub incoming: mpsc::UnboundedReceiver<Frame>,
    /// Frames (or errors) delivered to the client. Drop to simulate a lost connection.
    pub outgoing: mpsc::UnboundedSender<Result<Frame>>,
}

impl ServerSide {
    pub async fn next_frame(&mut self) -> Frame {
        timeout(Duration::from_secs(60), self.incoming.recv())
            .await
            .expect("Timed out waiting for a client frame")
            .expect("Client side of the connection is gone")
    }

    pub fn push(&self, frame: Frame) {
        self.outgoing
            .send(Ok(frame))
            .expect("Client stream receiver dropped");
    }
}

/// Client-side writer: frames go straight into the server's receiver.
struct ChannelSink(mpsc::UnboundedSender<Frame>);

impl Sink<Frame> for ChannelSink {
    type Error = ConnectorError;

    fn poll_ready(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn start_send(self: Pin<&mut Self>, frame: Frame) -> Result<()> {
        self.0
            .send(frame)
            .map_err(|_| ConnectorError::WebsocketError("peer went away".to_string()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }
}

struct MemoryState {
    plans: VecDeque<Plan>,
    fallback_accepts: bool,
    attempts: usize,
    requests: Vec<ConnectRequest>,
}

/// In-memory `Connector` following a script of [`Plan`]s.
#[derive(Clone)]
pub struct MemoryConnector {
    state: Arc<Mutex<MemoryState>>,
    accepted: mpsc::UnboundedSender<ServerSide>,
}

impl MemoryConnector {
    /// Once `plans` runs out, attempts are accepted if `fallback_accepts`, refused otherwise.
    pub fn new(plans: Vec<Plan>, fallback_accepts: bool) -> (Self, mpsc::UnboundedReceiver<ServerSide>) {
        let (accepted, accepted_rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(MemoryState {
                plans: plans.into(),
                fallback_accepts,
                attempts: 0,
                requests: Vec::new(),
            })),
            accepted,
        };
        (connector, accepted_rx)
    }

    pub fn attempts(&self) -> usize {
        self.state.lock().unwrap().attempts
    }

    pub fn requests(&self) -> Vec<ConnectRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    fn open_channel(accepted: &mpsc::UnboundedSender<ServerSide>) -> Result<Channel> {
        let (client_tx, server_rx) = mpsc::unbounded_channel::<Frame>();
        let (server_tx, client_rx) = mpsc::unbounded_channel::<Result<Frame>>();

        let sink = ChannelSink(client_tx);
        let stream = futures_util::stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        accepted
            .send(ServerSide {
                incoming: server_rx,
                outgoing: server_tx,
            })
            .map_err(|_| ConnectorError::WebsocketError("test server gone".to_string()))?;

        Ok(Channel {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

impl Connector for MemoryConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<Channel>> {
        let plan = {
            let mut state = self.state.lock().unwrap();
            state.attempts += 1;
            state.requests.push(request);
            match state.plans.pop_front() {
                Some(plan) => plan,
                None if state.fallback_accepts => Plan::Accept,
                None => Plan::Refuse,
            }
        };
        let accepted = self.accepted.clone();

        match plan {
            Plan::Accept => Box::pin(future::ready(Self::open_channel(&accepted))),
            Plan::Refuse => Box::pin(future::ready(Err(ConnectorError::WebsocketError(
                "connection refused".to_string(),
            )))),
            Plan::Hang => Box::pin(future::pending::<Result<Channel>>()),
            Plan::Gate(gate) => Box::pin(async move {
                let _ = gate.await;
                Self::open_channel(&accepted)
            }),
        }
    }
}

/// A cloneable summary of a `ClientEvent`.
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Open,
    Close { code: Option<u16>, manual: bool },
    Message(InboundMessage),
    Error(String),
    Reconnect(u32),
}

impl From<&ClientEvent> for Recorded {
    fn from(event: &ClientEvent) -> Self {
        match event {
            ClientEvent::Open => Recorded::Open,
            ClientEvent::Close(info) => Recorded::Close {
                code: info.code,
                manual: info.manual,
            },
            ClientEvent::Message(message) => Recorded::Message(message.clone()),
            ClientEvent::Error(e) => Recorded::Error(e.to_string()),
            ClientEvent::Reconnect { attempt } => Recorded::Reconnect(*attempt),
        }
    }
}

/// Subscribes to every event kind and forwards summaries to a channel.
pub fn record_events(client: &WebsocketClient) -> mpsc::UnboundedReceiver<Recorded> {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Listener = Arc::new(move |event: &ClientEvent| {
        let _ = tx.send(Recorded::from(event));
    });
    for kind in EventKind::ALL {
        client.on(kind, Arc::clone(&listener));
    }
    rx
}

/// Waits for the next recorded event matching `pred`, skipping others.
pub async fn next_matching<F>(rx: &mut mpsc::UnboundedReceiver<Recorded>, pred: F) -> Recorded
where
    F: Fn(&Recorded) -> bool,
{
    timeout(Duration::from_secs(60), async {
        loop {
            let event = rx.recv().await.expect("Event channel closed");
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("Timed out waiting for event")
}

/// Drains whatever has been recorded so far.
pub fn drain(rx: &mut mpsc::UnboundedReceiver<Recorded>) -> Vec<Recorded> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Waits for the connector to hand over the next accepted connection.
pub async fn accept(servers: &mut mpsc::UnboundedReceiver<ServerSide>) -> ServerSide {
    timeout(Duration::from_secs(60), servers.recv())
        .await
        .expect("Timed out waiting for a connection")
        .expect("Connector dropped")
}
