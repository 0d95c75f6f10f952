use crate::error::{ConnectorError, Result};
use crate::types::OutboundMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

const DEFAULT_RECONNECT_INTERVAL_MS: u64 = 5_000;
const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
const DEFAULT_CONNECTION_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_HEARTBEAT_MESSAGE: &str = "ping";

/// Prefix of the environment variables read by [`ConnectionConfig::from_env`].
pub const ENV_PREFIX: &str = "RESILIENT_WS_";

/// Settings for a [`super::WebsocketClient`].
///
/// Every field has a default, so a JSON document only needs the keys it wants to
/// change (usually just `url`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `ws://` or `wss://` endpoint.
    pub url: String,
    /// Reconnect automatically after an unrequested close.
    pub reconnect: bool,
    pub reconnect_interval_ms: u64,
    /// `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat: bool,
    pub heartbeat_interval_ms: u64,
    /// Sent verbatim when it is a JSON string, serialized otherwise.
    pub heartbeat_message: Value,
    pub connection_timeout_ms: u64,
    /// Offered in the `Sec-WebSocket-Protocol` handshake header.
    pub protocols: Vec<String>,
    /// Raise lifecycle logging from `debug` to `info`.
    pub debug: bool,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            reconnect: true,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL_MS,
            max_reconnect_attempts: None,
            heartbeat: true,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            heartbeat_message: Value::String(DEFAULT_HEARTBEAT_MESSAGE.to_string()),
            connection_timeout_ms: DEFAULT_CONNECTION_TIMEOUT_MS,
            protocols: Vec::new(),
            debug: false,
        }
    }
}

impl ConnectionConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from defaults plus `RESILIENT_WS_*` environment variables.
    ///
    /// Recognised suffixes: `URL`, `RECONNECT`, `RECONNECT_INTERVAL_MS`,
    /// `MAX_RECONNECT_ATTEMPTS`, `HEARTBEAT`, `HEARTBEAT_INTERVAL_MS`,
    /// `HEARTBEAT_MESSAGE`, `CONNECTION_TIMEOUT_MS`, `PROTOCOLS` (comma separated)
    /// and `DEBUG`.
    pub fn from_env() -> Result<Self> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides looked up by full variable name (e.g. `RESILIENT_WS_URL`).
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

        if let Some(url) = var("URL") {
            self.url = url;
        }
        if let Some(v) = parse_var::<bool>("RECONNECT", var("RECONNECT"))? {
            self.reconnect = v;
        }
        if let Some(v) = parse_var::<u64>("RECONNECT_INTERVAL_MS", var("RECONNECT_INTERVAL_MS"))? {
            self.reconnect_interval_ms = v;
        }
        if let Some(raw) = var("MAX_RECONNECT_ATTEMPTS") {
            let raw = raw.trim();
            self.max_reconnect_attempts = if raw.is_empty() || raw.eq_ignore_ascii_case("infinity")
            {
                None
            } else {
                parse_var::<u32>("MAX_RECONNECT_ATTEMPTS", Some(raw.to_string()))?
            };
        }
        if let Some(v) = parse_var::<bool>("HEARTBEAT", var("HEARTBEAT"))? {
            self.heartbeat = v;
        }
        if let Some(v) = parse_var::<u64>("HEARTBEAT_INTERVAL_MS", var("HEARTBEAT_INTERVAL_MS"))? {
            self.heartbeat_interval_ms = v;
        }
        if let Some(raw) = var("HEARTBEAT_MESSAGE") {
            self.heartbeat_message = serde_json::from_str(&raw).unwrap_or(Value::String(raw));
        }
        if let Some(v) = parse_var::<u64>("CONNECTION_TIMEOUT_MS", var("CONNECTION_TIMEOUT_MS"))? {
            self.connection_timeout_ms = v;
        }
        if let Some(raw) = var("PROTOCOLS") {
            self.protocols = raw
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(v) = parse_var::<bool>("DEBUG", var("DEBUG"))? {
            self.debug = v;
        }
        Ok(self)
    }

    /// Checks the settings and returns the parsed endpoint.
    pub fn validate(&self) -> Result<Url> {
        let url = Url::parse(&self.url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(ConnectorError::InvalidConfig(format!(
                    "Unsupported URL scheme '{}', expected ws or wss",
                    other
                )))
            }
        }
        if self.connection_timeout_ms == 0 {
            return Err(ConnectorError::InvalidConfig(
                "connection_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.heartbeat && self.heartbeat_interval_ms == 0 {
            return Err(ConnectorError::InvalidConfig(
                "heartbeat_interval_ms must be greater than 0 when heartbeat is enabled"
                    .to_string(),
            ));
        }
        Ok(url)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn heartbeat_payload(&self) -> OutboundMessage {
        OutboundMessage::from(self.heartbeat_message.clone())
    }
}

fn parse_var<T>(suffix: &str, raw: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|e| {
            ConnectorError::InvalidConfig(format!(
                "{}{} has invalid value '{}': {}",
                ENV_PREFIX, suffix, raw, e
            ))
        }),
    }
}
