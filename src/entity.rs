use serde::{Deserialize, Serialize};
use std::fmt;

/// `sender_id` carried by messages this bridge sent itself.
pub const LOCAL_SENDER: &str = "self";

pub fn is_local_sender(sender_id: &str) -> bool {
    sender_id == LOCAL_SENDER
}

/// A resolved directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Contact {
    pub jid: String,
    pub name: String,
}

impl Contact {
    pub fn new(jid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            jid: jid.into(),
            name: name.into(),
        }
    }

    /// Placeholder contact whose name is its own jid.
    pub fn from_jid(jid: impl Into<String>) -> Self {
        let jid = jid.into();
        Self {
            name: jid.clone(),
            jid,
        }
    }

    pub fn matches(&self, search: &str) -> bool {
        self.name.to_lowercase().contains(&search.to_lowercase()) || self.jid.contains(search)
    }
}

impl fmt::Display for Contact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.jid)
    }
}

/// Raw record from the messaging client's own contact directory.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub jid: String,
    #[serde(default = "default_found")]
    pub found: bool,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub push_name: Option<String>,
    #[serde(default)]
    pub business_name: Option<String>,
}

fn default_found() -> bool {
    true
}

impl DirectoryEntry {
    #[cfg(test)]
    pub fn new(jid: impl Into<String>) -> Self {
        Self {
            jid: jid.into(),
            found: true,
            ..Default::default()
        }
    }

    /// Display name by priority: full name, first name, push name, business name.
    pub fn display_name(&self) -> Option<&str> {
        [
            &self.full_name,
            &self.first_name,
            &self.push_name,
            &self.business_name,
        ]
        .into_iter()
        .filter_map(|name| name.as_deref())
        .map(str::trim)
        .find(|name| !name.is_empty())
    }

    pub fn to_contact(&self) -> Option<Contact> {
        if !self.found || self.jid.is_empty() {
            return None;
        }
        self.display_name()
            .map(|name| Contact::new(self.jid.clone(), name))
    }
}
