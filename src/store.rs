use crate::{
    chat::Message,
    entity::{is_local_sender, Contact},
    error::BridgeError,
};
use std::{
    collections::HashSet,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

pub const DEFAULT_QUERY_LIMIT: usize = 50;

// Entries are immutable once pushed, so a poisoned lock still guards a
// consistent vector and is recovered instead of propagated.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Append-only, arrival-ordered message log.
#[derive(Debug, Default)]
pub struct MessageStore {
    messages: RwLock<Vec<Message>>,
}

impl MessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message to the end of the log.
    pub fn append(&self, message: Message) -> Result<(), BridgeError> {
        if message.chat_id.is_empty() {
            return Err(BridgeError::Validation("chat_id must not be empty".into()));
        }
        write(&self.messages).push(message);
        Ok(())
    }

    /// Up to `limit` messages, newest first, optionally restricted to one chat.
    /// An empty `chat_id` behaves like `None`.
    pub fn query(&self, chat_id: Option<&str>, limit: usize) -> Vec<Message> {
        let chat_id = chat_id.filter(|id| !id.is_empty());
        read(&self.messages)
            .iter()
            .rev()
            .filter(|msg| chat_id.map_or(true, |id| msg.chat_id == id))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.messages).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Distinct remote sender ids in first-seen order.
    pub fn distinct_senders(&self) -> Vec<String> {
        let messages = read(&self.messages);
        let mut seen = HashSet::new();
        messages
            .iter()
            .map(|msg| msg.sender_id.as_str())
            .filter(|sender| !sender.is_empty() && !is_local_sender(sender))
            .filter(|sender| seen.insert(*sender))
            .map(str::to_string)
            .collect()
    }

    /// Runs `f` over the whole log under the shared lock.
    pub fn with_messages<R>(&self, f: impl FnOnce(&[Message]) -> R) -> R {
        f(&read(&self.messages))
    }
}

/// Resolved contact directory. Only ever replaced as a whole.
#[derive(Debug, Default)]
pub struct ContactDirectory {
    contacts: RwLock<Vec<Contact>>,
}

impl ContactDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the directory, keeping the first contact seen for each jid.
    pub fn replace(&self, contacts: Vec<Contact>) -> usize {
        let mut seen = HashSet::new();
        let deduped: Vec<Contact> = contacts
            .into_iter()
            .filter(|contact| seen.insert(contact.jid.clone()))
            .collect();
        let count = deduped.len();
        *write(&self.contacts) = deduped;
        count
    }

    pub fn list(&self) -> Vec<Contact> {
        read(&self.contacts).clone()
    }

    pub fn search(&self, search: &str) -> Vec<Contact> {
        read(&self.contacts)
            .iter()
            .filter(|contact| contact.matches(search))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        read(&self.contacts).len()
    }
}
