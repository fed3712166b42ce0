use crate::bus::{ClientEvent, ConnectionState};
use crate::chat::Message;
use crate::client::MessagingClient;
use crate::contacts::ContactResolver;
use crate::error::BridgeError;
use crate::store::MessageStore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Applies client events to the message log and drives contact sync.
pub struct IngestionPipeline {
    store: Arc<MessageStore>,
    resolver: Arc<ContactResolver>,
    client: Arc<dyn MessagingClient>,
    state: RwLock<ConnectionState>,
}

impl IngestionPipeline {
    pub fn new(
        store: Arc<MessageStore>,
        resolver: Arc<ContactResolver>,
        client: Arc<dyn MessagingClient>,
    ) -> Self {
        Self {
            store,
            resolver,
            client,
            state: RwLock::new(ConnectionState::Disconnected),
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|p| p.into_inner())
    }

    /// Consume events until the feed closes or the session is logged out.
    /// Runs on a single task so appends keep arrival order.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ClientEvent>) {
        info!("Ingestion pipeline started");
        while let Some(event) = rx.recv().await {
            if self.handle_event(event) == Flow::Stop {
                break;
            }
        }
        info!("Ingestion pipeline stopped");
    }

    pub fn handle_event(&self, event: ClientEvent) -> Flow {
        match event {
            ClientEvent::Message(inbound) => {
                let message = inbound.normalize();
                let preview: String = message.content.chars().take(50).collect();
                let sender = message.sender_id.clone();
                match self.store.append(message) {
                    Ok(()) => info!("Message received from {}: {}", sender, preview),
                    Err(e) => warn!("Dropping inbound message from {}: {}", sender, e),
                }
                Flow::Continue
            }
            ClientEvent::Receipt(receipt) => {
                // Observed only; message state is not updated.
                debug!(
                    "Receipt {:?} in {} for {:?}",
                    receipt.kind, receipt.chat_jid, receipt.message_ids
                );
                Flow::Continue
            }
            ClientEvent::Connection(next) => self.transition(next),
        }
    }

    fn transition(&self, next: ConnectionState) -> Flow {
        let previous = {
            let mut state = self.state.write().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *state, next)
        };
        if previous != next {
            info!("Connection state {:?} -> {:?}", previous, next);
        }

        if next.is_terminal() {
            warn!("Session logged out; no further events will be processed");
            return Flow::Stop;
        }
        if next == ConnectionState::Connected {
            info!("Connected, syncing contacts...");
            self.resolver.trigger();
        }
        Flow::Continue
    }

    /// Send a text message and record it once the network accepted it.
    pub async fn send(&self, chat_jid: &str, content: &str) -> Result<SendOutcome, BridgeError> {
        if chat_jid.trim().is_empty() || content.trim().is_empty() {
            return Err(BridgeError::Validation(
                "chat_jid and content are required".into(),
            ));
        }
        if !self.client.is_connected() {
            return Err(BridgeError::NotConnected);
        }

        // No lock is held across the network call.
        let receipt = self.client.send_text(chat_jid, content).await.map_err(|e| {
            warn!("Failed to send message to {}: {}", chat_jid, e);
            BridgeError::from(e)
        })?;

        self.store.append(Message::outgoing(
            receipt.id.clone(),
            chat_jid,
            content,
            receipt.timestamp,
        ))?;
        info!("Message sent to {}", chat_jid);

        Ok(SendOutcome {
            message_id: receipt.id,
            timestamp: receipt.timestamp,
        })
    }
}
