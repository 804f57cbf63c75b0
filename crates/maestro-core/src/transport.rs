//! Connection bookkeeping for the websocket gateway.
//!
//! Each live session owns one outbound channel; the registry tracks them so
//! the health endpoint can report active sessions and so a dead socket gets
//! dropped on the first failed send.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;

use crate::shared::OutboundMessage;

pub type OutboundSender = mpsc::UnboundedSender<OutboundMessage>;

#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, OutboundSender>,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(&self, session_id: &str, sender: OutboundSender) {
        self.connections.insert(session_id.to_string(), sender);
    }

    pub fn unregister(&self, session_id: &str) {
        self.connections.remove(session_id);
    }

    /// Best-effort delivery. A failed send means the socket writer is gone,
    /// so the entry is evicted rather than retried. Unknown sessions are a
    /// quiet no-op.
    pub fn send(&self, session_id: &str, message: OutboundMessage) -> bool {
        let delivered = match self.connections.get(session_id) {
            Some(sender) => sender.send(message).is_ok(),
            None => return false,
        };
        if !delivered {
            warn!(
                target: "maestro::transport",
                "Dropping outbound message for dead session {session_id}"
            );
            self.connections.remove(session_id);
        }
        delivered
    }

    /// Pushes one message to every live session. Used for shutdown notices.
    pub fn broadcast(&self, message: OutboundMessage) {
        let sessions: Vec<String> = self
            .connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        for session_id in sessions {
            self.send(&session_id, message.clone());
        }
    }

    pub fn active_count(&self) -> usize {
        self.connections.len()
    }
}
