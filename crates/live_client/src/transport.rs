use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, stream::BoxStream, Sink, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::debug;
use url::Url;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireMessage {
    Text(String),
    Binary(Vec<u8>),
    Close,
}

impl From<WireMessage> for Message {
    fn from(value: WireMessage) -> Self {
        match value {
            WireMessage::Text(text) => Message::Text(text),
            WireMessage::Binary(bytes) => Message::Binary(bytes),
            WireMessage::Close => Message::Close(None),
        }
    }
}

pub type InboundStream = BoxStream<'static, Result<WireMessage, TransportError>>;
pub type OutboundSink = Pin<Box<dyn Sink<WireMessage, Error = TransportError> + Send>>;

/// An open duplex channel. The inbound stream ending (or yielding
/// [`WireMessage::Close`]) means the peer went away.
pub struct Channel {
    pub outbound: OutboundSink,
    pub inbound: InboundStream,
}

#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Channel, TransportError>;
}

pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Channel, TransportError> {
        let (socket, response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::handshake(url.as_str(), err))?;
        debug!(%url, status = %response.status(), "live_client: websocket handshake complete");

        let (writer, reader) = socket.split();
        let outbound = writer.with(|message: WireMessage| {
            future::ready(Ok::<_, TransportError>(Message::from(message)))
        });
        let inbound = reader.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(WireMessage::Text(text))),
                Ok(Message::Binary(bytes)) => Some(Ok(WireMessage::Binary(bytes))),
                Ok(Message::Close(_)) => Some(Ok(WireMessage::Close)),
                Ok(_) => None,
                Err(err) => Some(Err(TransportError::from(err))),
            })
        });

        Ok(Channel {
            outbound: Box::pin(outbound),
            inbound: inbound.boxed(),
        })
    }
}
