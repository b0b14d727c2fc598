use std::sync::Arc;

use anyhow::Result;
use shared::{
    domain::TransactionId,
    investigation::Transaction,
    protocol::Frame,
};
use tokio::sync::watch;
use tracing::info;

pub mod bus;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod investigation;
pub mod transport;

pub use bus::{FrameBus, FrameStream, Subscription, SubscriptionId};
pub use commands::CommandEmitter;
pub use config::{load_settings, Settings};
pub use connection::{ConnectionManager, ConnectionOptions, ConnectionStatus, Outbox, ReconnectPolicy};
pub use error::TransportError;
pub use investigation::{
    AgentState, InvestigationEvent, InvestigationState, InvestigationTracker, Phase, TimelineEvent,
};
pub use transport::{Channel, Connector, WebSocketConnector, WireMessage};

/// One live connection wired to one investigation tracker. Everything it
/// spawned is torn down when it is shut down or dropped.
pub struct InvestigationSession {
    connection: ConnectionManager,
    tracker: InvestigationTracker,
    commands: CommandEmitter,
    _tracking: Subscription,
}

impl InvestigationSession {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self::with_connector(
            settings.connection_options()?,
            Arc::new(WebSocketConnector),
        ))
    }

    pub fn with_connector(options: ConnectionOptions, connector: Arc<dyn Connector>) -> Self {
        let bus = FrameBus::new();
        let tracker = InvestigationTracker::new();
        let tracking = tracker.attach(&bus);
        let connection = ConnectionManager::new(options, connector, bus);
        let commands = CommandEmitter::new(connection.outbox());
        Self {
            connection,
            tracker,
            commands,
            _tracking: tracking,
        }
    }

    pub fn connect(&self) {
        self.connection.connect();
    }

    /// Resets local state for `transaction_id`, then asks the producer to run
    /// it. Local state is reset even when the request cannot be sent.
    pub fn investigate(&self, transaction_id: TransactionId, transaction: Option<Transaction>) -> bool {
        self.tracker.start(transaction_id.clone());
        self.commands.investigate(transaction_id, transaction)
    }

    pub fn reset(&self) {
        self.tracker.reset();
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    pub fn snapshot(&self) -> InvestigationState {
        self.tracker.snapshot()
    }

    pub fn watch_investigation(&self) -> watch::Receiver<InvestigationState> {
        self.tracker.watch()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        self.connection.bus().subscribe(handler)
    }

    pub fn frames(&self) -> FrameStream {
        self.connection.bus().stream()
    }

    pub fn commands(&self) -> &CommandEmitter {
        &self.commands
    }

    pub async fn shutdown(&self) {
        self.connection.shutdown().await;
        info!("live_client: session closed");
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
