use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use futures::{sink, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use url::Url;

use crate::{
    error::TransportError,
    transport::{Channel, Connector, WireMessage},
};

pub(crate) const TEST_URL: &str = "ws://127.0.0.1:9/ws/investigations";

pub(crate) fn test_url() -> Url {
    Url::parse(TEST_URL).expect("test url")
}

/// Lets the supervisor and other spawned tasks run without letting a paused
/// clock auto-advance.
pub(crate) async fn settle() {
    for _ in 0..64 {
        tokio::task::yield_now().await;
    }
}

#[derive(Default)]
struct ConnectorState {
    attempts: usize,
    failures_remaining: usize,
    peers: VecDeque<Peer>,
}

/// In-memory connector: every successful connect yields a [`Peer`] playing
/// the producer side of the channel.
#[derive(Default)]
pub(crate) struct ChannelConnector {
    state: Mutex<ConnectorState>,
}

impl ChannelConnector {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn failing(times: usize) -> Arc<Self> {
        let connector = Self::default();
        connector.state.lock().expect("state").failures_remaining = times;
        Arc::new(connector)
    }

    pub(crate) fn attempts(&self) -> usize {
        self.state.lock().expect("state").attempts
    }

    pub(crate) fn next_peer(&self) -> Option<Peer> {
        self.state.lock().expect("state").peers.pop_front()
    }
}

#[async_trait]
impl Connector for ChannelConnector {
    async fn connect(&self, url: &Url) -> Result<Channel, TransportError> {
        let mut state = self.state.lock().expect("state");
        state.attempts += 1;
        if state.failures_remaining > 0 {
            state.failures_remaining -= 1;
            return Err(TransportError::handshake(url.as_str(), "connection refused"));
        }

        let (frames_tx, frames_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<WireMessage>();
        let outbound = sink::unfold(sent_tx, |sent_tx, message: WireMessage| async move {
            sent_tx
                .send(message)
                .map_err(|_| TransportError::ChannelClosed)?;
            Ok::<_, TransportError>(sent_tx)
        });
        state.peers.push_back(Peer {
            frames: frames_tx,
            sent: sent_rx,
        });

        Ok(Channel {
            outbound: Box::pin(outbound),
            inbound: UnboundedReceiverStream::new(frames_rx).boxed(),
        })
    }
}

pub(crate) struct Peer {
    frames: mpsc::UnboundedSender<Result<WireMessage, TransportError>>,
    sent: mpsc::UnboundedReceiver<WireMessage>,
}

impl Peer {
    pub(crate) fn push_frame(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    pub(crate) fn push_raw(&self, text: &str) {
        let _ = self.frames.send(Ok(WireMessage::Text(text.to_string())));
    }

    pub(crate) fn push_message(&self, message: WireMessage) {
        let _ = self.frames.send(Ok(message));
    }

    pub(crate) fn fail(&self) {
        let _ = self.frames.send(Err(TransportError::ChannelClosed));
    }

    pub(crate) fn sent_messages(&mut self) -> Vec<WireMessage> {
        let mut messages = Vec::new();
        while let Ok(message) = self.sent.try_recv() {
            messages.push(message);
        }
        messages
    }

    pub(crate) fn sent_json(&mut self) -> Vec<Value> {
        self.sent_messages()
            .into_iter()
            .filter_map(|message| match message {
                WireMessage::Text(text) => serde_json::from_str(&text).ok(),
                _ => None,
            })
            .collect()
    }
}
