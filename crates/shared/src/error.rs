use thiserror::Error;

use crate::protocol::FrameKind;

/// A single inbound frame that could not be interpreted. Always recoverable:
/// the frame is dropped and the channel stays open.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame payload is not valid UTF-8")]
    NotUtf8,
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("unknown agent `{0}`")]
    UnknownAgent(String),
    #[error("{kind:?} frame is missing `{field}`")]
    MissingField {
        kind: FrameKind,
        field: &'static str,
    },
    #[error("invalid `{field}` payload in {kind:?} frame: {source}")]
    InvalidPayload {
        kind: FrameKind,
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl ProtocolError {
    pub fn invalid_payload(kind: FrameKind, field: &'static str, source: serde_json::Error) -> Self {
        Self::InvalidPayload {
            kind,
            field,
            source,
        }
    }
}
