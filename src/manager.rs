use crate::bus::{ClientEvent, ConnectionState};
use crate::chat::{ChatSummary, Message};
use crate::client::MessagingClient;
use crate::contacts::{ContactResolver, SyncTrigger};
use crate::entity::Contact;
use crate::error::BridgeError;
use crate::pipeline::{IngestionPipeline, SendOutcome};
use crate::query;
use crate::store::{ContactDirectory, MessageStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

pub const MODE_LIVE: &str = "live";
pub const MODE_DISCONNECTED: &str = "disconnected";

#[derive(Debug, Clone, Serialize)]
pub struct Health {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub connected: bool,
    /// Last connection state reported by the client.
    pub state: ConnectionState,
    pub messages_count: usize,
    pub contacts_count: usize,
    pub contacts_syncing: bool,
    pub mode: &'static str,
}

/// Owns the message log, the contact directory and everything that mutates them.
pub struct Manager {
    client: Arc<dyn MessagingClient>,
    store: Arc<MessageStore>,
    directory: Arc<ContactDirectory>,
    resolver: Arc<ContactResolver>,
    pipeline: Arc<IngestionPipeline>,
}

impl Manager {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        fetch_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        let store = Arc::new(MessageStore::new());
        let directory = Arc::new(ContactDirectory::new());
        let resolver = Arc::new(ContactResolver::new(
            client.clone(),
            store.clone(),
            directory.clone(),
            fetch_timeout,
            settle_delay,
        ));
        let pipeline = Arc::new(IngestionPipeline::new(
            store.clone(),
            resolver.clone(),
            client.clone(),
        ));

        Self {
            client,
            store,
            directory,
            resolver,
            pipeline,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }

    pub fn mode(&self) -> &'static str {
        if self.is_connected() {
            MODE_LIVE
        } else {
            MODE_DISCONNECTED
        }
    }

    /// Start consuming client events in the background.
    pub fn start_ingestion(&self, rx: mpsc::Receiver<ClientEvent>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.pipeline.clone().run(rx))
    }

    pub fn health(&self) -> Health {
        Health {
            status: "healthy",
            timestamp: Utc::now(),
            connected: self.is_connected(),
            state: self.pipeline.connection_state(),
            messages_count: self.store.len(),
            contacts_count: self.directory.len(),
            contacts_syncing: self.resolver.is_running(),
            mode: self.mode(),
        }
    }

    pub fn messages(&self, chat_jid: Option<&str>, limit: usize) -> Vec<Message> {
        self.store.query(chat_jid, limit)
    }

    pub async fn send_message(&self, chat_jid: &str, content: &str) -> Result<SendOutcome, BridgeError> {
        self.pipeline.send(chat_jid, content).await
    }

    pub fn contacts(&self, search: Option<&str>) -> Vec<Contact> {
        query::search_contacts(&self.directory, search)
    }

    /// On-demand contact sync. Requires a live connection, returns without waiting.
    pub fn sync_contacts(&self) -> Result<SyncTrigger, BridgeError> {
        if !self.is_connected() {
            return Err(BridgeError::NotConnected);
        }
        Ok(self.resolver.trigger())
    }

    pub fn chats(&self) -> Vec<ChatSummary> {
        query::chat_summaries(&self.store)
    }
}
