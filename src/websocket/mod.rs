//! Self-healing WebSocket client.
//!
//! [`WebsocketClient`] wraps a single WebSocket endpoint and keeps it usable across
//! network trouble:
//!
//! - Automatic reconnection after an unrequested close, with a fixed delay and an
//!   optional attempt limit
//! - A connection timeout on every handshake
//! - A periodic heartbeat message while the connection is open
//! - An outbound queue that buffers messages until the connection opens
//! - Listeners for `open`, `close`, `message`, `error` and `reconnect` events
//!
//! # Usage
//!
//! ```no_run
//! use resilient_connector_rs::types::{ClientEvent, EventKind, InboundMessage};
//! use resilient_connector_rs::websocket::{ConnectionConfig, Listener, WebsocketClient};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ConnectionConfig::new("wss://echo.example.com/ws");
//!     let client = WebsocketClient::new(config).expect("Invalid config");
//!
//!     let on_message: Listener = Arc::new(|event: &ClientEvent| {
//!         if let ClientEvent::Message(InboundMessage::Json(value)) = event {
//!             println!("Received: {}", value);
//!         }
//!     });
//!     client.on(EventKind::Message, on_message.clone());
//!     client.on(
//!         EventKind::Error,
//!         Arc::new(|event: &ClientEvent| eprintln!("Error: {:?}", event)),
//!     );
//!
//!     client.connect();
//!     client.send("hello");
//!
//!     tokio::signal::ctrl_c().await.expect("Failed to listen for ctrl+c");
//!     client.off(EventKind::Message, &on_message);
//!     client.destroy();
//! }
//! ```
//!
//! # Reconnection Behavior
//!
//! - A close that was not requested through `disconnect` schedules a reconnect after
//!   `reconnect_interval_ms` (default 5 seconds)
//! - Each scheduled reconnect increments the attempt counter and fires a `reconnect`
//!   event right before connecting
//! - The counter resets to zero whenever a connection opens
//! - When `max_reconnect_attempts` is reached the client becomes
//!   [`ConnectionState::Abandoned`](crate::types::ConnectionState::Abandoned): queued
//!   messages are dropped and later sends fail with an `error` event
//!
//! # Message Handling
//!
//! Text frames are parsed as JSON when possible and passed through as raw text
//! otherwise. Listeners run on the driver task and should return quickly.

pub mod client;
pub mod config;
pub mod listeners;
pub mod transport;

pub use client::WebsocketClient;
pub use config::ConnectionConfig;
pub use listeners::{Listener, ListenerRegistry};
pub use transport::{Channel, ConnectRequest, Connector, Frame, TungsteniteConnector};
