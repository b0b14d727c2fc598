use std::sync::Mutex;

use serde_json::json;
use shared::{
    domain::{AgentIdentity, AgentStatus, FinalDecision, InvestigationStatus},
    protocol::FrameKind,
};

use super::*;
use crate::test_support::{settle, test_url, ChannelConnector};

fn session(connector: &Arc<ChannelConnector>) -> InvestigationSession {
    InvestigationSession::with_connector(ConnectionOptions::new(test_url()), Arc::clone(connector) as Arc<dyn Connector>)
}

#[tokio::test(start_paused = true)]
async fn investigate_resets_state_then_sends_command() {
    let connector = ChannelConnector::new();
    let session = session(&connector);
    session.connect();
    settle().await;
    assert_eq!(session.status(), ConnectionStatus::Connected);

    assert!(session.investigate(TransactionId::from("TXN-1"), None));
    settle().await;

    let mut peer = connector.next_peer().expect("peer");
    assert_eq!(
        peer.sent_json(),
        vec![json!({"type": "investigate", "transaction_id": "TXN-1"})]
    );
    let state = session.snapshot();
    assert!(state.is_investigating());
    assert_eq!(state.timeline().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn investigate_while_disconnected_still_starts_locally() {
    let connector = ChannelConnector::new();
    let session = session(&connector);

    assert!(!session.investigate(TransactionId::from("TXN-1"), None));

    let state = session.snapshot();
    assert_eq!(
        state.investigation().map(|i| i.status),
        Some(InvestigationStatus::Pending)
    );
    assert_eq!(connector.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn full_run_over_the_channel_reaches_decline() {
    let connector = ChannelConnector::new();
    let session = session(&connector);
    let mut updates = session.watch_investigation();
    session.connect();
    settle().await;

    session.investigate(TransactionId::from("TXN-1"), None);
    let peer = connector.next_peer().expect("peer");
    peer.push_frame(json!({"type": "investigation_start", "transaction_id": "TXN-1"}));
    peer.push_frame(json!({"type": "agent_thinking", "data": {"agent": "Risk Analyst"}}));
    peer.push_frame(json!({
        "type": "agent_result",
        "data": {"agent": "Risk Analyst", "result": {"risk_score": 0.85, "risk_level": "HIGH"}}
    }));
    peer.push_frame(json!({
        "type": "investigation_complete",
        "result": {
            "transaction_id": "TXN-1",
            "timestamp": "2024-05-01T12:00:00",
            "risk_analysis": {"risk_score": 0.85},
            "final_decision": "DECLINE",
            "status": "completed"
        }
    }));
    settle().await;

    assert!(updates.has_changed().expect("tracker alive"));
    let state = updates.borrow_and_update().clone();
    assert!(!state.is_investigating());
    assert_eq!(state.final_decision(), Some(FinalDecision::Decline));
    assert_eq!(state.timeline().len(), 4);
    assert_eq!(
        state.agent(AgentIdentity::RiskAnalyst).status,
        AgentStatus::Complete
    );
}

#[tokio::test(start_paused = true)]
async fn second_subscriber_sees_feed_frames_independently() {
    let connector = ChannelConnector::new();
    let session = session(&connector);
    let feed = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&feed);
    let _feed = session.subscribe(move |frame| {
        if matches!(frame.kind, FrameKind::TransactionNew | FrameKind::MetricsUpdate) {
            sink.lock().expect("feed").push(frame.kind);
        }
    });
    session.connect();
    settle().await;

    let peer = connector.next_peer().expect("peer");
    peer.push_frame(json!({"type": "transaction_new", "data": {"transaction_id": "TXN-7"}}));
    peer.push_frame(json!({"type": "agent_thinking", "data": {"agent": "Fraud Investigator"}}));
    peer.push_frame(json!({"type": "metrics_update", "data": {"total": 12}}));
    settle().await;

    assert_eq!(
        *feed.lock().expect("feed"),
        vec![FrameKind::TransactionNew, FrameKind::MetricsUpdate]
    );
    assert_eq!(
        session.snapshot().agent(AgentIdentity::FraudInvestigator).status,
        AgentStatus::Thinking
    );
}

#[tokio::test(start_paused = true)]
async fn reset_and_shutdown_leave_a_clean_session() {
    let connector = ChannelConnector::new();
    let session = session(&connector);
    session.connect();
    settle().await;
    session.investigate(TransactionId::from("TXN-1"), None);

    session.reset();
    assert_eq!(session.snapshot(), InvestigationState::default());

    session.shutdown().await;
    assert_eq!(session.status(), ConnectionStatus::Disconnected);
    assert!(!session.commands().ping());
}
