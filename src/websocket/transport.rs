use crate::error::{ConnectorError, Result};
use crate::types::OutboundMessage;
use futures_util::future::{self, BoxFuture};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use log::info;
use std::borrow::Cow;
use std::pin::Pin;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};
use url::Url;

/// A single WebSocket frame as seen by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    /// Close code and reason, if the peer sent any.
    Close(Option<(u16, String)>),
}

impl Frame {
    /// Encodes an outbound message, serializing JSON payloads to text.
    pub fn encode(message: OutboundMessage) -> Result<Self> {
        Ok(match message {
            OutboundMessage::Text(text) => Frame::Text(text),
            OutboundMessage::Binary(bytes) => Frame::Binary(bytes),
            OutboundMessage::Json(value) => Frame::Text(serde_json::to_string(&value)?),
        })
    }

    fn from_message(message: Message) -> Option<Self> {
        match message {
            Message::Text(text) => Some(Frame::Text(text)),
            Message::Binary(bytes) => Some(Frame::Binary(bytes)),
            Message::Ping(data) => Some(Frame::Ping(data)),
            Message::Pong(data) => Some(Frame::Pong(data)),
            Message::Close(close_frame) => Some(Frame::Close(
                close_frame.map(|f| (u16::from(f.code), f.reason.into_owned())),
            )),
            Message::Frame(_) => None,
        }
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        match frame {
            Frame::Text(text) => Message::Text(text),
            Frame::Binary(bytes) => Message::Binary(bytes),
            Frame::Ping(data) => Message::Ping(data),
            Frame::Pong(data) => Message::Pong(data),
            Frame::Close(close) => Message::Close(close.map(|(code, reason)| CloseFrame {
                code: CloseCode::from(code),
                reason: Cow::Owned(reason),
            })),
        }
    }
}

pub type FrameSink = Pin<Box<dyn Sink<Frame, Error = ConnectorError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame>> + Send>>;

/// Both halves of an established connection.
pub struct Channel {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub url: Url,
    pub protocols: Vec<String>,
}

/// Opens duplex connections for a client. The future resolves once the handshake is done.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<Channel>>;
}

/// Default [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TungsteniteConnector;

impl Connector for TungsteniteConnector {
    fn connect(&self, request: ConnectRequest) -> BoxFuture<'static, Result<Channel>> {
        Box::pin(async move {
            let mut client_request = request.url.as_str().into_client_request()?;
            if !request.protocols.is_empty() {
                let value = HeaderValue::from_str(&request.protocols.join(", ")).map_err(|e| {
                    ConnectorError::InvalidConfig(format!("Invalid sub-protocol list: {}", e))
                })?;
                client_request
                    .headers_mut()
                    .insert("Sec-WebSocket-Protocol", value);
            }

            info!("Connecting to WebSocket: {}", request.url);
            let (ws_stream, response) = connect_async(client_request).await.map_err(|e| {
                ConnectorError::WebsocketError(format!("WebSocket connection failed: {}", e))
            })?;
            info!(
                "WebSocket connected successfully. Response: {:?}",
                response.status()
            );

            let (write, read) = ws_stream.split();
            let sink =
                write.with(|frame: Frame| future::ready(Ok::<_, ConnectorError>(Message::from(frame))));
            let stream = read.filter_map(|message| {
                future::ready(match message {
                    Ok(message) => Frame::from_message(message).map(Ok),
                    Err(e) => Some(Err(ConnectorError::from(e))),
                })
            });

            Ok(Channel {
                sink: Box::pin(sink),
                stream: Box::pin(stream),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_serializes_json() {
        let frame = Frame::encode(OutboundMessage::Json(json!({"type": "chat"}))).unwrap();
        assert_eq!(frame, Frame::Text(r#"{"type":"chat"}"#.to_string()));
    }

    #[test]
    fn test_encode_keeps_text_and_binary() {
        assert_eq!(
            Frame::encode(OutboundMessage::from("ping")).unwrap(),
            Frame::Text("ping".to_string())
        );
        assert_eq!(
            Frame::encode(OutboundMessage::from(vec![1u8, 2, 3])).unwrap(),
            Frame::Binary(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_close_frame_maps_both_ways() {
        let message = Message::from(Frame::Close(Some((4000, "bye".to_string()))));
        match &message {
            Message::Close(Some(frame)) => {
                assert_eq!(u16::from(frame.code), 4000);
                assert_eq!(frame.reason, "bye");
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(
            Frame::from_message(message),
            Some(Frame::Close(Some((4000, "bye".to_string()))))
        );
        assert_eq!(
            Frame::from_message(Message::Close(None)),
            Some(Frame::Close(None))
        );
    }
}
