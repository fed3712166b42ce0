use crate::chat::ChatSummary;
use crate::entity::Contact;
use crate::store::{ContactDirectory, MessageStore};
use std::collections::HashMap;

/// One summary per chat, most recently active first.
pub fn chat_summaries(store: &MessageStore) -> Vec<ChatSummary> {
    let mut by_chat: HashMap<String, ChatSummary> = HashMap::new();
    store.with_messages(|messages| {
        for msg in messages {
            by_chat
                .entry(msg.chat_id.clone())
                .and_modify(|summary| {
                    summary.message_count += 1;
                    if msg.timestamp > summary.last_message {
                        summary.last_message = msg.timestamp;
                    }
                })
                .or_insert_with(|| ChatSummary {
                    chat_jid: msg.chat_id.clone(),
                    message_count: 1,
                    last_message: msg.timestamp,
                });
        }
    });

    let mut chats: Vec<ChatSummary> = by_chat.into_values().collect();
    chats.sort_by(|a, b| {
        b.last_message
            .cmp(&a.last_message)
            .then_with(|| a.chat_jid.cmp(&b.chat_jid))
    });
    chats
}

/// Contacts whose name (case-insensitive) or raw jid contains `search`.
/// The term is used as given; only an empty term lists everything.
pub fn search_contacts(directory: &ContactDirectory, search: Option<&str>) -> Vec<Contact> {
    match search.filter(|s| !s.is_empty()) {
        Some(search) => directory.search(search),
        None => directory.list(),
    }
}
