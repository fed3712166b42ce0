use crate::entity::LOCAL_SENDER;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Unknown,
}

/// One stored chat event. Entries are never modified after insertion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "chat_jid")]
    pub chat_id: String,
    #[serde(rename = "sender_jid")]
    pub sender_id: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
}

impl Message {
    /// A text message sent by this bridge.
    pub fn outgoing(
        id: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            chat_id: chat_id.into(),
            sender_id: LOCAL_SENDER.to_string(),
            content: content.into(),
            timestamp,
            message_type: MessageType::Text,
            media_path: None,
        }
    }
}

/// Per-chat aggregate computed at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub chat_jid: String,
    pub message_count: usize,
    pub last_message: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtendedText {
    #[serde(default)]
    pub text: Option<String>,
}

/// Media attachment. Only its presence is used; attributes are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaInfo {}

/// Provider payload as delivered by the messaging client. Any subset of the
/// fields may be present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPayload {
    #[serde(default)]
    pub conversation: Option<String>,
    #[serde(default)]
    pub extended_text_message: Option<ExtendedText>,
    #[serde(default)]
    pub image_message: Option<MediaInfo>,
    #[serde(default)]
    pub video_message: Option<MediaInfo>,
    #[serde(default)]
    pub audio_message: Option<MediaInfo>,
    #[serde(default)]
    pub document_message: Option<MediaInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    Conversation(String),
    ExtendedText(String),
    Image,
    Video,
    Audio,
    Document,
    Unknown,
}

impl RawPayload {
    /// Picks exactly one payload kind. Earlier arms win when several fields are set.
    pub fn classify(&self) -> MessagePayload {
        match self {
            RawPayload {
                conversation: Some(text),
                ..
            } if !text.is_empty() => MessagePayload::Conversation(text.clone()),
            RawPayload {
                extended_text_message: Some(ext),
                ..
            } => MessagePayload::ExtendedText(ext.text.clone().unwrap_or_default()),
            RawPayload {
                image_message: Some(_),
                ..
            } => MessagePayload::Image,
            RawPayload {
                video_message: Some(_),
                ..
            } => MessagePayload::Video,
            RawPayload {
                audio_message: Some(_),
                ..
            } => MessagePayload::Audio,
            RawPayload {
                document_message: Some(_),
                ..
            } => MessagePayload::Document,
            _ => MessagePayload::Unknown,
        }
    }
}

impl MessagePayload {
    pub fn message_type(&self) -> MessageType {
        match self {
            MessagePayload::Conversation(_) | MessagePayload::ExtendedText(_) => MessageType::Text,
            MessagePayload::Image => MessageType::Image,
            MessagePayload::Video => MessageType::Video,
            MessagePayload::Audio => MessageType::Audio,
            MessagePayload::Document => MessageType::Document,
            MessagePayload::Unknown => MessageType::Unknown,
        }
    }

    pub fn into_content(self) -> String {
        match self {
            MessagePayload::Conversation(text) | MessagePayload::ExtendedText(text) => text,
            MessagePayload::Image => "[image]".to_string(),
            MessagePayload::Video => "[video]".to_string(),
            MessagePayload::Audio => "[audio]".to_string(),
            MessagePayload::Document => "[document]".to_string(),
            MessagePayload::Unknown => "[unsupported message]".to_string(),
        }
    }
}

/// An inbound message event before normalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub chat_jid: String,
    pub sender_jid: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub message: RawPayload,
}

impl InboundMessage {
    pub fn normalize(self) -> Message {
        let payload = self.message.classify();
        let message_type = payload.message_type();
        Message {
            id: self.id,
            chat_id: self.chat_jid,
            sender_id: self.sender_jid,
            content: payload.into_content(),
            timestamp: self.timestamp,
            message_type,
            media_path: None,
        }
    }
}
