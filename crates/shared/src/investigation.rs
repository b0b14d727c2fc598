use serde::{de::DeserializeOwned, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::domain::{AgentIdentity, FinalDecision, InvestigationStatus, TransactionId};

// Agent payloads are model output. Every known field tolerates `null` or a
// value of the wrong type and falls back to its default; the rest of the
// record still decodes.

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RiskAnalysis {
    #[serde(default, deserialize_with = "lenient_score")]
    pub risk_score: f64,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub risk_factors: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub patterns: Vec<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub routing_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub escalated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_breakdown: Option<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FraudInvestigation {
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub fraud_likelihood: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub recommendation: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub fraud_indicators: Vec<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    #[serde(default, deserialize_with = "lenient_number", skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    pub suggested_actions: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ComplianceCheck {
    #[serde(default, deserialize_with = "lenient_flag")]
    pub sar_required: bool,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub sar_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient_flag")]
    pub ctr_required: bool,
    #[serde(default, deserialize_with = "lenient")]
    pub aml_violations: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub kyc_flags: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub regulatory_actions: Vec<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub compliance_notes: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub risk_rating: Option<String>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub compliance_summary: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The output of one agent. Which shape applies is decided by the agent that
/// produced it, never guessed from the payload. A payload that is not a JSON
/// object is kept as-is in `Unstructured`.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentResult {
    RiskAnalysis(RiskAnalysis),
    FraudInvestigation(FraudInvestigation),
    ComplianceCheck(ComplianceCheck),
    Unstructured { agent: AgentIdentity, value: Value },
}

impl AgentResult {
    pub fn decode(agent: AgentIdentity, value: Value) -> Self {
        if !value.is_object() {
            return AgentResult::Unstructured { agent, value };
        }
        let typed = match agent {
            AgentIdentity::RiskAnalyst => {
                serde_json::from_value(value.clone()).map(AgentResult::RiskAnalysis)
            }
            AgentIdentity::FraudInvestigator => {
                serde_json::from_value(value.clone()).map(AgentResult::FraudInvestigation)
            }
            AgentIdentity::ComplianceOfficer => {
                serde_json::from_value(value.clone()).map(AgentResult::ComplianceCheck)
            }
        };
        typed.unwrap_or(AgentResult::Unstructured { agent, value })
    }

    pub fn agent(&self) -> AgentIdentity {
        match self {
            AgentResult::RiskAnalysis(_) => AgentIdentity::RiskAnalyst,
            AgentResult::FraudInvestigation(_) => AgentIdentity::FraudInvestigator,
            AgentResult::ComplianceCheck(_) => AgentIdentity::ComplianceOfficer,
            AgentResult::Unstructured { agent, .. } => *agent,
        }
    }
}

impl Serialize for AgentResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AgentResult::RiskAnalysis(risk) => risk.serialize(serializer),
            AgentResult::FraudInvestigation(fraud) => fraud.serialize(serializer),
            AgentResult::ComplianceCheck(compliance) => compliance.serialize(serializer),
            AgentResult::Unstructured { value, .. } => value.serialize(serializer),
        }
    }
}

/// Snapshot of one investigation. Decoding only fails when the payload is
/// not an object; off-shape fields fall back to their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Investigation {
    #[serde(default, deserialize_with = "lenient")]
    pub transaction_id: TransactionId,
    #[serde(default, deserialize_with = "lenient")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient")]
    pub steps: Vec<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub risk_analysis: Option<RiskAnalysis>,
    #[serde(default, deserialize_with = "lenient")]
    pub fraud_investigation: Option<FraudInvestigation>,
    #[serde(default, deserialize_with = "lenient")]
    pub compliance_check: Option<ComplianceCheck>,
    #[serde(default, deserialize_with = "lenient_decision")]
    pub final_decision: Option<FinalDecision>,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub decision_reason: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub status: InvestigationStatus,
    #[serde(default, deserialize_with = "lenient", skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Investigation {
    pub fn pending(transaction_id: TransactionId, timestamp: impl Into<String>) -> Self {
        Self {
            transaction_id,
            timestamp: timestamp.into(),
            steps: Vec::new(),
            risk_analysis: None,
            fraud_investigation: None,
            compliance_check: None,
            final_decision: None,
            decision_reason: None,
            status: InvestigationStatus::Pending,
            error: None,
        }
    }

    /// Writes one agent's result into the slot owned by that agent; every
    /// other field is left as it was. Unstructured results have no slot.
    pub fn record_result(&mut self, result: AgentResult) {
        match result {
            AgentResult::RiskAnalysis(risk) => self.risk_analysis = Some(risk),
            AgentResult::FraudInvestigation(fraud) => self.fraud_investigation = Some(fraud),
            AgentResult::ComplianceCheck(compliance) => self.compliance_check = Some(compliance),
            AgentResult::Unstructured { .. } => {}
        }
    }

    pub fn result_for(&self, agent: AgentIdentity) -> Option<AgentResult> {
        match agent {
            AgentIdentity::RiskAnalyst => self.risk_analysis.clone().map(AgentResult::RiskAnalysis),
            AgentIdentity::FraudInvestigator => self
                .fraud_investigation
                .clone()
                .map(AgentResult::FraudInvestigation),
            AgentIdentity::ComplianceOfficer => self
                .compliance_check
                .clone()
                .map(AgentResult::ComplianceCheck),
        }
    }

    pub fn fail(&mut self, error: Option<String>) {
        self.status = InvestigationStatus::Error;
        self.error = error;
    }
}

/// Full transaction payload sent alongside synthetic (`CUSTOM-`) ids.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Transaction {
    pub transaction_id: TransactionId,
    #[serde(default)]
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merchant_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hour: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub velocity: Option<f64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

fn lenient_score<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    lenient_number(deserializer).map(Option::unwrap_or_default)
}

fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Bool(flag) => flag,
        Value::String(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        Value::Number(number) => number.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    })
}

fn lenient_decision<'de, D>(deserializer: D) -> Result<Option<FinalDecision>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(raw) => FinalDecision::from_label(&raw),
        _ => None,
    })
}
