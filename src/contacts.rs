use crate::client::MessagingClient;
use crate::entity::Contact;
use crate::error::ClientError;
use crate::store::{ContactDirectory, MessageStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Which strategy produced the current directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionTier {
    Directory,
    Chats,
    Messages,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Started,
    /// A pass was already in flight; this trigger was folded into it.
    AlreadyRunning,
}

/// Rebuilds the contact directory through a fallback chain:
/// client directory, then chat metadata, then message senders.
/// A later tier only runs when the earlier one could not be reached.
pub struct ContactResolver {
    client: Arc<dyn MessagingClient>,
    store: Arc<MessageStore>,
    directory: Arc<ContactDirectory>,
    fetch_timeout: Duration,
    settle_delay: Duration,
    running: AtomicBool,
}

struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl ContactResolver {
    pub fn new(
        client: Arc<dyn MessagingClient>,
        store: Arc<MessageStore>,
        directory: Arc<ContactDirectory>,
        fetch_timeout: Duration,
        settle_delay: Duration,
    ) -> Self {
        Self {
            client,
            store,
            directory,
            fetch_timeout,
            settle_delay,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Start a background pass and return immediately.
    pub fn trigger(self: &Arc<Self>) -> SyncTrigger {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Contact sync already in flight, coalescing trigger");
            return SyncTrigger::AlreadyRunning;
        }

        let resolver = self.clone();
        tokio::spawn(async move {
            let _guard = RunningGuard(&resolver.running);
            if !resolver.settle_delay.is_zero() {
                tokio::time::sleep(resolver.settle_delay).await;
            }
            resolver.resolve_now().await;
        });
        SyncTrigger::Started
    }

    /// Run one full pass inline and replace the directory with its result.
    pub async fn resolve_now(&self) -> ResolutionTier {
        let (tier, contacts) = match self.directory_tier().await {
            Ok(contacts) => (ResolutionTier::Directory, contacts),
            Err(e) => {
                warn!("Contact directory unavailable ({}), falling back", e);
                match self.chat_tier() {
                    Some(contacts) => (ResolutionTier::Chats, contacts),
                    None => (ResolutionTier::Messages, self.message_tier()),
                }
            }
        };

        let count = self.directory.replace(contacts);
        info!("Synced {} contacts from {:?} tier", count, tier);
        tier
    }

    async fn directory_tier(&self) -> Result<Vec<Contact>, ClientError> {
        let entries = tokio::time::timeout(self.fetch_timeout, self.client.contacts())
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(|e| {
                error!("Failed to fetch contact directory: {}", e);
                e
            })?;

        let total = entries.len();
        let contacts: Vec<Contact> = entries.iter().filter_map(|e| e.to_contact()).collect();
        if contacts.len() < total {
            debug!("Dropped {} nameless directory entries", total - contacts.len());
        }
        Ok(contacts)
    }

    // Chat metadata has no source of its own yet.
    fn chat_tier(&self) -> Option<Vec<Contact>> {
        debug!("Chat-derived contacts unavailable, deferring to message senders");
        None
    }

    fn message_tier(&self) -> Vec<Contact> {
        if self.store.is_empty() {
            debug!("No messages logged yet, directory will be empty");
        }
        self.store
            .distinct_senders()
            .into_iter()
            .map(Contact::from_jid)
            .collect()
    }
}
