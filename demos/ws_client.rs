// demos/ws_client.rs
use resilient_connector_rs::types::{ClientEvent, EventKind};
use resilient_connector_rs::websocket::{ConnectionConfig, Listener, WebsocketClient};
use serde_json::json;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

// Prints every event the client reports
fn event_handler(event: &ClientEvent) {
    match event {
        ClientEvent::Open => println!("Connection Open."),
        ClientEvent::Close(info) => println!(
            "Connection Closed. code: {:?}, reason: {}, manual: {}",
            info.code, info.reason, info.manual
        ),
        ClientEvent::Message(message) => println!("Received Message: {:?}", message),
        ClientEvent::Error(e) => eprintln!("Client Error: {}", e),
        ClientEvent::Reconnect { attempt } => println!("Reconnecting (attempt {})...", attempt),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging (optional)
    env_logger::init();

    // Optional: Load .env file if you have one
    dotenv::dotenv().ok();

    // RESILIENT_WS_URL and friends override the defaults below
    let mut config = ConnectionConfig::new("wss://echo.websocket.org");
    config.max_reconnect_attempts = Some(5);
    let config = config.with_overrides(|key| std::env::var(key).ok())?;

    println!("Connecting to {}...", config.url);
    let client = WebsocketClient::new(config)?;

    let handler: Listener = Arc::new(event_handler);
    for kind in EventKind::ALL {
        client.on(kind, Arc::clone(&handler));
    }

    // Messages sent before the connection opens are queued
    client.connect();
    client.send("hello");
    client.send(json!({"type": "chat", "message": "Hello from resilient-connector-rs"}));

    println!("Listening for messages for 30 seconds...");
    sleep(Duration::from_secs(30)).await;

    println!("Stopping client...");
    client.disconnect(None, Some("demo finished"));
    sleep(Duration::from_secs(1)).await;
    client.destroy();

    println!("Example finished.");
    Ok(())
}
