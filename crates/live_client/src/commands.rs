use shared::{
    domain::TransactionId,
    investigation::Transaction,
    protocol::ClientCommand,
};
use tracing::info;

use crate::connection::Outbox;

/// Builds outbound commands and hands them to the open channel.
#[derive(Clone)]
pub struct CommandEmitter {
    outbox: Outbox,
}

impl CommandEmitter {
    pub fn new(outbox: Outbox) -> Self {
        Self { outbox }
    }

    /// Requests an investigation. `transaction` is only sent for `CUSTOM-`
    /// ids. Returns whether the command was queued on an open channel.
    pub fn investigate(&self, transaction_id: TransactionId, transaction: Option<Transaction>) -> bool {
        let custom = transaction_id.is_custom();
        let command = ClientCommand::investigate(transaction_id.clone(), transaction);
        let sent = self.outbox.send(&command);
        if sent {
            info!(%transaction_id, custom, "live_client: investigate requested");
        }
        sent
    }

    pub fn ping(&self) -> bool {
        self.outbox.send(&ClientCommand::Ping)
    }
}
