use crate::bus::{ClientEvent, ConnectionState, EventBus};
use crate::client::rpc::{
    self, InitializeParams, JsonRpcRequest, JsonRpcResponse, SendMessageParams,
};
use crate::client::{MessagingClient, SendReceipt};
use crate::entity::DirectoryEntry;
use crate::error::ClientError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::io::{BufRead, BufReader, Write};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task;
use tracing::{debug, error, info, warn};

type Pending = Arc<Mutex<HashMap<String, oneshot::Sender<JsonRpcResponse>>>>;

fn lock_pending(pending: &Pending) -> MutexGuard<'_, HashMap<String, oneshot::Sender<JsonRpcResponse>>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Messaging client backed by a protocol helper process speaking
/// line-delimited JSON-RPC over stdio.
pub struct SidecarClient {
    tx_request: mpsc::Sender<JsonRpcRequest>,
    pending_requests: Pending,
    request_id_counter: AtomicU64,
    connected: Arc<AtomicBool>,
    request_timeout: Duration,
}

impl SidecarClient {
    /// Spawn `command` through the shell and wire its stdio.
    pub fn spawn(command: &str, bus: EventBus, request_timeout: Duration) -> Result<Self> {
        info!("Spawning messaging helper: {}", command);
        let child = Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .context("Failed to spawn messaging helper")?;
        Self::new(child, bus, request_timeout)
    }

    pub fn new(mut child: Child, bus: EventBus, request_timeout: Duration) -> Result<Self> {
        let stdin = child.stdin.take().context("Failed to take helper stdin")?;
        let stdout = child.stdout.take().context("Failed to take helper stdout")?;

        let (tx_request, mut rx_request) = mpsc::channel::<JsonRpcRequest>(100);
        let pending_requests: Pending = Arc::new(Mutex::new(HashMap::new()));
        let connected = Arc::new(AtomicBool::new(false));

        // Stdin writer
        task::spawn_blocking(move || {
            let mut stdin = stdin;
            while let Some(req) = rx_request.blocking_recv() {
                let json_str = match serde_json::to_string(&req) {
                    Ok(s) => s,
                    Err(e) => {
                        error!("Failed to serialize request: {}", e);
                        continue;
                    }
                };

                debug!("-> helper: {}", json_str);

                if let Err(e) = writeln!(stdin, "{}", json_str).and_then(|_| stdin.flush()) {
                    error!("Failed to write to helper stdin: {}", e);
                    break;
                }
            }
            debug!("Helper stdin writer finished");
        });

        // Stdout reader. Notifications are forwarded in arrival order.
        let pending_clone = pending_requests.clone();
        let connected_clone = connected.clone();
        task::spawn_blocking(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Error reading from helper stdout: {}", e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                debug!("<- helper: {}", line);

                if let Ok(response) = serde_json::from_str::<JsonRpcResponse>(&line) {
                    let key = rpc::id_key(&response.id);
                    let sender = lock_pending(&pending_clone).remove(&key);
                    match sender {
                        Some(tx) => {
                            let _ = tx.send(response);
                        }
                        None => warn!("Received response for unknown id: {}", key),
                    }
                } else if let Ok(notification) = serde_json::from_str::<JsonRpcRequest>(&line) {
                    match rpc::decode_event(&notification) {
                        Ok(Some(event)) => {
                            if let ClientEvent::Connection(state) = &event {
                                connected_clone
                                    .store(*state == ConnectionState::Connected, Ordering::SeqCst);
                            }
                            if !bus.publish_blocking(event) {
                                warn!("Ingestion pipeline stopped; dropping helper events");
                                break;
                            }
                        }
                        Ok(None) => debug!("Ignoring helper notification {}", notification.method),
                        Err(e) => error!("Malformed {} notification: {}", notification.method, e),
                    }
                } else {
                    error!("Failed to parse helper message: {}", line);
                }
            }

            debug!("Helper stdout reader finished");
            connected_clone.store(false, Ordering::SeqCst);
            // Dropping the senders wakes every waiting caller with "helper exited".
            lock_pending(&pending_clone).clear();
            let _ = bus.publish_blocking(ClientEvent::Connection(ConnectionState::Disconnected));
            let _ = child.wait();
        });

        Ok(Self {
            tx_request,
            pending_requests,
            request_id_counter: AtomicU64::new(1),
            connected,
            request_timeout,
        })
    }

    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<JsonRpcResponse, ClientError> {
        let id = self.request_id_counter.fetch_add(1, Ordering::SeqCst);
        let key = id.to_string();
        let (tx, rx) = oneshot::channel();
        lock_pending(&self.pending_requests).insert(key.clone(), tx);

        if self
            .tx_request
            .send(JsonRpcRequest::new(method, params, id))
            .await
            .is_err()
        {
            lock_pending(&self.pending_requests).remove(&key);
            return Err(ClientError::Unavailable("helper writer closed".into()));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(ClientError::Unavailable("helper exited".into())),
            Err(_) => {
                lock_pending(&self.pending_requests).remove(&key);
                Err(ClientError::Timeout)
            }
        }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let response = self.send_request(method, params).await?;
        if let Some(err) = response.error {
            return Err(ClientError::Rejected(format!("{} ({})", err.message, err.code)));
        }
        let result = response.result.unwrap_or(Value::Null);
        serde_json::from_value(result)
            .map_err(|e| ClientError::Rejected(format!("bad {} result: {}", method, e)))
    }

    /// Handshake with the helper. Pairing happens on the helper's side.
    pub async fn initialize(&self, device_name: &str) -> Result<()> {
        let params = InitializeParams {
            device_name: device_name.to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        let result: Value = self
            .call(rpc::METHOD_INITIALIZE, Some(serde_json::to_value(params)?))
            .await
            .context("Helper initialize failed")?;

        info!("Messaging helper initialized: {}", result);
        Ok(())
    }
}

#[async_trait]
impl MessagingClient for SidecarClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send_text(&self, chat_jid: &str, content: &str) -> Result<SendReceipt, ClientError> {
        let params = serde_json::to_value(SendMessageParams { chat_jid, content })
            .map_err(|e| ClientError::Rejected(e.to_string()))?;
        self.call(rpc::METHOD_SEND_MESSAGE, Some(params)).await
    }

    async fn contacts(&self) -> Result<Vec<DirectoryEntry>, ClientError> {
        self.call(rpc::METHOD_CONTACTS_LIST, None)
            .await
            .map_err(|e| match e {
                ClientError::Rejected(msg) => ClientError::Unavailable(msg),
                other => other,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageType;

    // Helper script: answers one send_message, then emits a connected event
    // followed by a text message, and stays up until its stdin closes.
    const SCRIPT: &str = r#"
read line
echo '{"jsonrpc":"2.0","id":1,"result":{"id":"WA-1","timestamp":"2024-05-01T10:00:00Z"}}'
echo '{"jsonrpc":"2.0","method":"event.connection","params":{"state":"connected"}}'
echo '{"jsonrpc":"2.0","method":"event.message","params":{"id":"IN-1","chat_jid":"c@s.whatsapp.net","sender_jid":"x@s.whatsapp.net","timestamp":"2024-05-01T10:00:01Z","message":{"conversation":"hola"}}}'
read line
"#;

    #[tokio::test(flavor = "multi_thread")]
    async fn round_trips_through_helper_process() {
        let (bus, mut rx) = EventBus::new();
        let client = SidecarClient::spawn(SCRIPT, bus, Duration::from_secs(5)).unwrap();

        let receipt = client.send_text("c@s.whatsapp.net", "hi").await.unwrap();
        assert_eq!(receipt.id, "WA-1");

        assert!(matches!(
            rx.recv().await,
            Some(ClientEvent::Connection(ConnectionState::Connected))
        ));
        match rx.recv().await {
            Some(ClientEvent::Message(inbound)) => {
                let msg = inbound.normalize();
                assert_eq!(msg.content, "hola");
                assert_eq!(msg.message_type, MessageType::Text);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(client.is_connected());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn helper_exit_fails_pending_requests_immediately() {
        let (bus, _rx) = EventBus::new();
        let client = SidecarClient::spawn("read line; exit 0", bus, Duration::from_secs(5)).unwrap();

        let started = std::time::Instant::now();
        let result = client.send_text("c@s.whatsapp.net", "hi").await;

        assert!(matches!(result, Err(ClientError::Unavailable(_))), "{:?}", result);
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(!client.is_connected());
    }
}
