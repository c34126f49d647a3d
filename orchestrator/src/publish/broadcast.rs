//! Publisher backed by a tokio broadcast channel
//!
//! Observers (WebSocket fan-out, an MQTT bridge, a TUI) subscribe to the
//! typed event stream; lagging subscribers miss events rather than
//! blocking the engine.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use crate::models::confirmation::ConfirmationRequest;
use crate::models::progress::ProgressUpdate;
use crate::models::session::DeploymentSession;
use crate::publish::ProgressPublisher;

/// One notification on the event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Status {
        session_id: String,
        session: DeploymentSession,
    },
    Progress {
        session_id: String,
        update: ProgressUpdate,
    },
    ConfirmationRequested {
        session_id: String,
        request: ConfirmationRequest,
    },
}

impl ProgressEvent {
    pub fn session_id(&self) -> &str {
        match self {
            ProgressEvent::Status { session_id, .. } => session_id,
            ProgressEvent::Progress { session_id, .. } => session_id,
            ProgressEvent::ConfirmationRequested { session_id, .. } => session_id,
        }
    }
}

/// Fan-out publisher over a broadcast channel
pub struct BroadcastPublisher {
    tx: broadcast::Sender<ProgressEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to the event stream
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    fn send(&self, event: ProgressEvent) {
        // A send error only means nobody is subscribed right now
        if self.tx.send(event).is_err() {
            debug!("Progress event dropped: no subscribers");
        }
    }
}

impl Default for BroadcastPublisher {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressPublisher for BroadcastPublisher {
    fn publish_status(&self, session_id: &str, snapshot: &DeploymentSession) {
        self.send(ProgressEvent::Status {
            session_id: session_id.to_string(),
            session: snapshot.clone(),
        });
    }

    fn publish_progress(&self, session_id: &str, update: &ProgressUpdate) {
        self.send(ProgressEvent::Progress {
            session_id: session_id.to_string(),
            update: update.clone(),
        });
    }

    fn publish_confirmation(&self, session_id: &str, request: &ConfirmationRequest) {
        self.send(ProgressEvent::ConfirmationRequested {
            session_id: session_id.to_string(),
            request: request.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::session::{DeployMode, DeploymentSession};
    use serde_json::Map;

    #[tokio::test]
    async fn test_subscriber_receives_status() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();

        let session = DeploymentSession::new("s-1".to_string(), DeployMode::Trust, Map::new());
        publisher.publish_status("s-1", &session);

        match rx.recv().await.unwrap() {
            ProgressEvent::Status { session_id, .. } => assert_eq!(session_id, "s-1"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_does_not_fail() {
        let publisher = BroadcastPublisher::new(8);
        let session = DeploymentSession::new("s-1".to_string(), DeployMode::Trust, Map::new());

        publisher.publish_status("s-1", &session);
    }
}
