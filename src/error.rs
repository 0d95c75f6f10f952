use std::time::Duration;
use thiserror::Error;
use url::ParseError;

pub type Result<T, E = ConnectorError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error("Invalid Configuration: {0}")]
    InvalidConfig(String),

    #[error("URL Parsing Error: {0}")]
    UrlParseError(#[from] ParseError),

    #[error("WebSocket Error: {0}")]
    WebsocketError(String),

    #[error("Connection Timeout: handshake did not complete within {0:?}")]
    ConnectionTimeout(Duration),

    #[error("Send Failure: {0}")]
    SendFailure(String),

    #[error("Reconnect Exhausted: gave up after {attempts} attempts, message not sent")]
    ReconnectExhausted { attempts: u32 },

    #[error("JSON Serialization/Deserialization Error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Client has been destroyed")]
    ClientDestroyed,
}

impl From<tokio_tungstenite::tungstenite::Error> for ConnectorError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ConnectorError::WebsocketError(err.to_string())
    }
}
