//! The outbound half of a client connection.

use super::protocol::ServerMessage;
use tokio::sync::mpsc;
use tracing::debug;

/// Sends events to exactly one connected client.
///
/// Emitting on a cleared or closed channel is a no-op, so late provider
/// results for a departed client are dropped without error.
#[derive(Clone, Debug, Default)]
pub struct ClientChannel {
    tx: Option<mpsc::Sender<ServerMessage>>,
}

impl ClientChannel {
    pub fn new(tx: mpsc::Sender<ServerMessage>) -> Self {
        Self { tx: Some(tx) }
    }

    pub async fn emit(&self, msg: ServerMessage) {
        match &self.tx {
            Some(tx) => {
                if tx.send(msg).await.is_err() {
                    debug!("Client channel closed; dropping outbound event.");
                }
            }
            None => debug!("Client channel cleared; dropping outbound event."),
        }
    }

    /// Detaches the channel from its client.
    pub fn clear(&mut self) {
        self.tx = None;
    }
}
