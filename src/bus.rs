use crate::chat::InboundMessage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 1024;

/// Everything the messaging client can tell us.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientEvent {
    /// A chat message arrived
    Message(InboundMessage),

    /// Delivery/read receipt for one or more messages
    Receipt(Receipt),

    /// Connection lifecycle changed
    Connection(ConnectionState),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Receipt {
    pub chat_jid: String,
    pub message_ids: Vec<String>,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    Pairing,
    Connected,
    /// Fatal auth failure; the session will not come back.
    LoggedOut,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Pairing => "pairing",
            ConnectionState::Connected => "connected",
            ConnectionState::LoggedOut => "logged_out",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::LoggedOut)
    }
}

/// Single-consumer feed from the messaging client into the ingestion pipeline.
/// One receiver keeps append order equal to arrival order.
#[derive(Clone)]
pub struct EventBus {
    tx: mpsc::Sender<ClientEvent>,
}

impl EventBus {
    pub fn new() -> (Self, mpsc::Receiver<ClientEvent>) {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        (Self { tx }, rx)
    }

    /// Returns false once the pipeline has stopped consuming.
    #[cfg(test)]
    pub async fn publish(&self, event: ClientEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    /// For producers running on blocking threads. Must not be called from async context.
    pub fn publish_blocking(&self, event: ClientEvent) -> bool {
        self.tx.blocking_send(event).is_ok()
    }
}
