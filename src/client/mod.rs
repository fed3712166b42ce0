pub mod rpc;
pub mod sidecar;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::DirectoryEntry;
use crate::error::ClientError;

/// Identifier and timestamp the network assigned to a sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendReceipt {
    pub id: String,
    pub timestamp: DateTime<Utc>,
}

/// The external messaging client. Protocol, pairing and encryption live behind it.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn send_text(&self, chat_jid: &str, content: &str) -> Result<SendReceipt, ClientError>;

    /// The client's own contact directory.
    async fn contacts(&self) -> Result<Vec<DirectoryEntry>, ClientError>;
}

/// Stand-in used when no protocol helper is configured.
pub struct DetachedClient;

#[async_trait]
impl MessagingClient for DetachedClient {
    fn is_connected(&self) -> bool {
        false
    }

    async fn send_text(&self, _chat_jid: &str, _content: &str) -> Result<SendReceipt, ClientError> {
        Err(ClientError::NotConnected)
    }

    async fn contacts(&self) -> Result<Vec<DirectoryEntry>, ClientError> {
        Err(ClientError::NotConnected)
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Scriptable client for tests.
    pub struct MockClient {
        pub connected: AtomicBool,
        pub send_result: Mutex<Result<SendReceipt, ClientError>>,
        pub contacts_result: Mutex<Result<Vec<DirectoryEntry>, ClientError>>,
        pub contacts_delay: Mutex<Duration>,
        pub send_calls: AtomicUsize,
        pub contacts_calls: AtomicUsize,
    }

    impl MockClient {
        pub fn connected() -> Self {
            Self {
                connected: AtomicBool::new(true),
                send_result: Mutex::new(Ok(SendReceipt {
                    id: "SENT-1".to_string(),
                    timestamp: Utc::now(),
                })),
                contacts_result: Mutex::new(Ok(Vec::new())),
                contacts_delay: Mutex::new(Duration::ZERO),
                send_calls: AtomicUsize::new(0),
                contacts_calls: AtomicUsize::new(0),
            }
        }

        pub fn disconnected() -> Self {
            let client = Self::connected();
            client.connected.store(false, Ordering::SeqCst);
            client
        }

        pub fn with_contacts(self, result: Result<Vec<DirectoryEntry>, ClientError>) -> Self {
            *self.contacts_result.lock().unwrap() = result;
            self
        }

        pub fn with_send(self, result: Result<SendReceipt, ClientError>) -> Self {
            *self.send_result.lock().unwrap() = result;
            self
        }

        pub fn with_contacts_delay(self, delay: Duration) -> Self {
            *self.contacts_delay.lock().unwrap() = delay;
            self
        }

        pub fn sends(&self) -> usize {
            self.send_calls.load(Ordering::SeqCst)
        }

        pub fn contact_fetches(&self) -> usize {
            self.contacts_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MessagingClient for MockClient {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn send_text(&self, _chat_jid: &str, _content: &str) -> Result<SendReceipt, ClientError> {
            self.send_calls.fetch_add(1, Ordering::SeqCst);
            self.send_result.lock().unwrap().clone()
        }

        async fn contacts(&self) -> Result<Vec<DirectoryEntry>, ClientError> {
            self.contacts_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.contacts_delay.lock().unwrap();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            self.contacts_result.lock().unwrap().clone()
        }
    }
}
