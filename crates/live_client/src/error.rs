use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Failures of the underlying channel. These never reach callers: they are
/// logged and fed into the reconnect path.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("handshake with {url} failed: {reason}")]
    Handshake { url: String, reason: String },
    #[error("websocket transport failed: {0}")]
    Socket(#[from] tungstenite::Error),
    #[error("transport channel closed")]
    ChannelClosed,
}

impl TransportError {
    pub fn handshake(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Handshake {
            url: url.into(),
            reason: reason.to_string(),
        }
    }
}
