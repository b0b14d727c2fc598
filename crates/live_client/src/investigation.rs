use std::sync::Arc;

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use shared::{
    domain::{
        AgentIdentity, AgentStatus, FinalDecision, TimelineSource, TimelineStatus, TransactionId,
    },
    error::ProtocolError,
    investigation::{AgentResult, Investigation},
    protocol::{AgentResultData, AgentThinkingData, Frame, FrameKind},
};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bus::{FrameBus, Subscription};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentState {
    pub name: AgentIdentity,
    pub status: AgentStatus,
    pub result: Option<AgentResult>,
}

impl AgentState {
    fn idle(name: AgentIdentity) -> Self {
        Self {
            name,
            status: AgentStatus::Idle,
            result: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp: String,
    pub agent: TimelineSource,
    pub status: TimelineStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Investigating,
    Completed,
    Errored,
}

/// Lifecycle events carried by the frame stream, validated at ingestion.
#[derive(Debug, Clone, PartialEq)]
pub enum InvestigationEvent {
    Started,
    AgentThinking {
        agent: AgentIdentity,
        message: Option<String>,
    },
    AgentResult(AgentResult),
    Completed(Option<Box<Investigation>>),
    Failed(Option<String>),
}

impl InvestigationEvent {
    /// `Ok(None)` for frames that are not part of the investigation
    /// lifecycle (metrics, pongs, feed updates and the like).
    pub fn from_frame(frame: &Frame) -> Result<Option<Self>, ProtocolError> {
        let event = match frame.kind {
            FrameKind::InvestigationStart => InvestigationEvent::Started,
            FrameKind::AgentThinking => {
                let data: AgentThinkingData = frame.data_as()?;
                InvestigationEvent::AgentThinking {
                    agent: data.agent.parse()?,
                    message: data.message,
                }
            }
            FrameKind::AgentResult => {
                let data: AgentResultData = frame.data_as()?;
                let agent: AgentIdentity = data.agent.parse()?;
                let result = data.result.ok_or(ProtocolError::MissingField {
                    kind: frame.kind,
                    field: "result",
                })?;
                InvestigationEvent::AgentResult(AgentResult::decode(agent, result))
            }
            FrameKind::InvestigationComplete => {
                let snapshot = match frame.result.clone() {
                    Some(value) => match serde_json::from_value::<Investigation>(value) {
                        Ok(snapshot) => Some(Box::new(snapshot)),
                        Err(err) => {
                            warn!(%err, "live_client: ignoring malformed investigation snapshot");
                            None
                        }
                    },
                    None => None,
                };
                InvestigationEvent::Completed(snapshot)
            }
            FrameKind::InvestigationError => InvestigationEvent::Failed(frame.error.clone()),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }
}

/// Client-visible state derived from the event stream. Plain data mutated
/// through `&mut self`; sharing is handled by [`InvestigationTracker`].
#[derive(Debug, Clone, PartialEq)]
pub struct InvestigationState {
    investigation: Option<Investigation>,
    agents: [AgentState; 3],
    timeline: Vec<TimelineEvent>,
    final_decision: Option<FinalDecision>,
    investigating: bool,
    phase: Phase,
    snapshot_received: bool,
}

impl Default for InvestigationState {
    fn default() -> Self {
        Self {
            investigation: None,
            agents: AgentIdentity::ALL.map(AgentState::idle),
            timeline: Vec::new(),
            final_decision: None,
            investigating: false,
            phase: Phase::Idle,
            snapshot_received: false,
        }
    }
}

impl InvestigationState {
    pub fn investigation(&self) -> Option<&Investigation> {
        self.investigation.as_ref()
    }

    pub fn agents(&self) -> &[AgentState; 3] {
        &self.agents
    }

    pub fn agent(&self, identity: AgentIdentity) -> &AgentState {
        &self.agents[identity.index()]
    }

    pub fn timeline(&self) -> &[TimelineEvent] {
        &self.timeline
    }

    pub fn final_decision(&self) -> Option<FinalDecision> {
        self.final_decision
    }

    pub fn is_investigating(&self) -> bool {
        self.investigating
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Whether the producer's final snapshot has replaced the local record
    /// since the last `start`/`reset`.
    pub fn has_snapshot(&self) -> bool {
        self.snapshot_received
    }

    pub fn start(&mut self, transaction_id: TransactionId, timestamp: String) {
        *self = Self::default();
        self.investigating = true;
        self.phase = Phase::Investigating;
        self.investigation = Some(Investigation::pending(transaction_id, timestamp.clone()));
        self.record(timestamp, TimelineSource::System, TimelineStatus::Started, None);
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// The producer's snapshot is authoritative: it replaces whatever was
    /// accumulated locally, including the final decision. A snapshot without
    /// a transaction id keeps the one already tracked.
    pub fn replace_investigation(&mut self, mut snapshot: Investigation) {
        if snapshot.transaction_id.as_str().is_empty() {
            if let Some(current) = &self.investigation {
                snapshot.transaction_id = current.transaction_id.clone();
            }
        }
        self.final_decision = snapshot.final_decision;
        self.investigation = Some(snapshot);
        self.snapshot_received = true;
    }

    /// Applies one inbound frame. Returns whether the state changed.
    pub fn handle_frame(&mut self, frame: &Frame) -> bool {
        match InvestigationEvent::from_frame(frame) {
            Ok(Some(event)) => {
                let timestamp = frame.timestamp.clone().unwrap_or_else(now_timestamp);
                self.apply(event, timestamp)
            }
            Ok(None) => false,
            Err(err) => {
                warn!(%err, kind = ?frame.kind, "live_client: ignoring investigation frame");
                false
            }
        }
    }

    pub fn apply(&mut self, event: InvestigationEvent, timestamp: String) -> bool {
        match event {
            InvestigationEvent::Started => {
                let changed = !self.investigating || self.phase != Phase::Investigating;
                self.investigating = true;
                self.phase = Phase::Investigating;
                changed
            }
            InvestigationEvent::AgentThinking { agent, message } => {
                self.agents[agent.index()].status = AgentStatus::Thinking;
                let message = message.unwrap_or_else(|| format!("{agent} analyzing..."));
                self.record(timestamp, agent.into(), TimelineStatus::Started, Some(message));
                true
            }
            InvestigationEvent::AgentResult(result) => {
                let agent = result.agent();
                let slot = &mut self.agents[agent.index()];
                slot.status = AgentStatus::Complete;
                slot.result = Some(result.clone());
                if let Some(investigation) = self.investigation.as_mut() {
                    investigation.record_result(result);
                }
                self.record(
                    timestamp,
                    agent.into(),
                    TimelineStatus::Completed,
                    Some(format!("{agent} completed analysis")),
                );
                true
            }
            InvestigationEvent::Completed(snapshot) => {
                self.investigating = false;
                self.phase = Phase::Completed;
                if let Some(snapshot) = snapshot {
                    self.replace_investigation(*snapshot);
                }
                self.record(
                    timestamp,
                    TimelineSource::System,
                    TimelineStatus::Completed,
                    Some("Investigation complete".to_string()),
                );
                true
            }
            InvestigationEvent::Failed(error) => {
                self.investigating = false;
                self.phase = Phase::Errored;
                let message = error
                    .clone()
                    .unwrap_or_else(|| "Investigation failed".to_string());
                if let Some(investigation) = self.investigation.as_mut() {
                    investigation.fail(error);
                }
                self.record(
                    timestamp,
                    TimelineSource::System,
                    TimelineStatus::Error,
                    Some(message),
                );
                true
            }
        }
    }

    fn record(
        &mut self,
        timestamp: String,
        agent: TimelineSource,
        status: TimelineStatus,
        message: Option<String>,
    ) {
        debug!(%agent, ?status, "live_client: timeline entry");
        self.timeline.push(TimelineEvent {
            timestamp,
            agent,
            status,
            message,
        });
    }
}

/// Shared handle over [`InvestigationState`]; every change is published to
/// `watch` receivers for renderers.
#[derive(Clone)]
pub struct InvestigationTracker {
    state: Arc<watch::Sender<InvestigationState>>,
}

impl Default for InvestigationTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InvestigationTracker {
    pub fn new() -> Self {
        let (state, _) = watch::channel(InvestigationState::default());
        Self {
            state: Arc::new(state),
        }
    }

    pub fn attach(&self, bus: &FrameBus) -> Subscription {
        let state = Arc::clone(&self.state);
        bus.subscribe(move |frame| {
            state.send_if_modified(|state| state.handle_frame(frame));
        })
    }

    pub fn start(&self, transaction_id: TransactionId) {
        info!(%transaction_id, "live_client: starting investigation");
        self.state
            .send_modify(|state| state.start(transaction_id, now_timestamp()));
    }

    pub fn reset(&self) {
        self.state.send_modify(InvestigationState::reset);
    }

    pub fn handle_frame(&self, frame: &Frame) -> bool {
        self.state.send_if_modified(|state| state.handle_frame(frame))
    }

    pub fn snapshot(&self) -> InvestigationState {
        self.state.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<InvestigationState> {
        self.state.subscribe()
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "tests/investigation_tests.rs"]
mod tests;
