use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

const CUSTOM_TRANSACTION_PREFIX: &str = "CUSTOM-";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Synthetic transactions are unknown to the producer's store and must
    /// travel with their full payload.
    pub fn is_custom(&self) -> bool {
        self.0.starts_with(CUSTOM_TRANSACTION_PREFIX)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TransactionId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentIdentity {
    #[serde(rename = "Risk Analyst")]
    RiskAnalyst,
    #[serde(rename = "Fraud Investigator")]
    FraudInvestigator,
    #[serde(rename = "Compliance Officer")]
    ComplianceOfficer,
}

impl AgentIdentity {
    pub const ALL: [AgentIdentity; 3] = [
        AgentIdentity::RiskAnalyst,
        AgentIdentity::FraudInvestigator,
        AgentIdentity::ComplianceOfficer,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AgentIdentity::RiskAnalyst => "Risk Analyst",
            AgentIdentity::FraudInvestigator => "Fraud Investigator",
            AgentIdentity::ComplianceOfficer => "Compliance Officer",
        }
    }

    pub fn index(self) -> usize {
        match self {
            AgentIdentity::RiskAnalyst => 0,
            AgentIdentity::FraudInvestigator => 1,
            AgentIdentity::ComplianceOfficer => 2,
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentIdentity {
    type Err = ProtocolError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AgentIdentity::ALL
            .into_iter()
            .find(|agent| agent.as_str() == value)
            .ok_or_else(|| ProtocolError::UnknownAgent(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    #[default]
    Idle,
    Thinking,
    Complete,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimelineStatus {
    Started,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvestigationStatus {
    #[default]
    Pending,
    Completed,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FinalDecision {
    Approve,
    Decline,
    Review,
}

impl FinalDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            FinalDecision::Approve => "APPROVE",
            FinalDecision::Decline => "DECLINE",
            FinalDecision::Review => "REVIEW",
        }
    }

    /// Case-insensitive; blank or unrecognized labels yield `None`.
    pub fn from_label(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        [FinalDecision::Approve, FinalDecision::Decline, FinalDecision::Review]
            .into_iter()
            .find(|decision| decision.as_str().eq_ignore_ascii_case(raw))
    }
}

impl fmt::Display for FinalDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who a timeline entry is attributed to: one of the agents or the
/// orchestrating system itself. Encoded on the wire as a bare string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TimelineSource {
    System,
    Agent(AgentIdentity),
}

impl TimelineSource {
    pub const SYSTEM_LABEL: &'static str = "System";

    pub fn as_str(self) -> &'static str {
        match self {
            TimelineSource::System => Self::SYSTEM_LABEL,
            TimelineSource::Agent(agent) => agent.as_str(),
        }
    }
}

impl fmt::Display for TimelineSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<AgentIdentity> for TimelineSource {
    fn from(value: AgentIdentity) -> Self {
        TimelineSource::Agent(value)
    }
}

impl From<TimelineSource> for String {
    fn from(value: TimelineSource) -> Self {
        value.as_str().to_string()
    }
}

impl TryFrom<String> for TimelineSource {
    type Error = ProtocolError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == Self::SYSTEM_LABEL {
            return Ok(TimelineSource::System);
        }
        value.parse().map(TimelineSource::Agent)
    }
}
