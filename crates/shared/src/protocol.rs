use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::TransactionId,
    error::ProtocolError,
    investigation::Transaction,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Connected,
    Subscribed,
    TransactionNew,
    InvestigationStart,
    AgentThinking,
    AgentResult,
    InvestigationComplete,
    InvestigationError,
    MetricsUpdate,
    Pong,
    Error,
}

/// One decoded unit of the inbound event stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: FrameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<TransactionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Feed payload of `transaction_new`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Frame {
    pub fn new(kind: FrameKind) -> Self {
        Self {
            kind,
            timestamp: None,
            transaction_id: None,
            data: None,
            result: None,
            transaction: None,
            message: None,
            error: None,
        }
    }

    pub fn decode(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn decode_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = std::str::from_utf8(bytes).map_err(|_| ProtocolError::NotUtf8)?;
        Self::decode(text)
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = Some(timestamp.into());
        self
    }

    pub fn with_transaction_id(mut self, transaction_id: TransactionId) -> Self {
        self.transaction_id = Some(transaction_id);
        self
    }

    /// The `transaction_new` payload, when it has the usual record shape.
    pub fn feed_transaction(&self) -> Option<Transaction> {
        serde_json::from_value(self.transaction.clone()?).ok()
    }

    /// Decodes `data` into the payload type for this frame's tag.
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        let data = self.data.clone().ok_or(ProtocolError::MissingField {
            kind: self.kind,
            field: "data",
        })?;
        serde_json::from_value(data)
            .map_err(|source| ProtocolError::invalid_payload(self.kind, "data", source))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentThinkingData {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentResultData {
    pub agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    Investigate {
        transaction_id: TransactionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        transaction_data: Option<Transaction>,
    },
    Ping,
}

impl ClientCommand {
    /// Builds the investigate command. The transaction payload is attached
    /// only for `CUSTOM-` ids; every other id is resolved by the producer.
    pub fn investigate(transaction_id: TransactionId, transaction: Option<Transaction>) -> Self {
        let transaction_data = if transaction_id.is_custom() {
            transaction
        } else {
            None
        };
        ClientCommand::Investigate {
            transaction_id,
            transaction_data,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
