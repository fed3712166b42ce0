use crate::bus::{ClientEvent, ConnectionState, Receipt};
use crate::chat::InboundMessage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// JSON-RPC 2.0 framing spoken with the protocol helper

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_SEND_MESSAGE: &str = "send_message";
pub const METHOD_CONTACTS_LIST: &str = "contacts.list";

pub const EVENT_MESSAGE: &str = "event.message";
pub const EVENT_RECEIPT: &str = "event.receipt";
pub const EVENT_CONNECTION: &str = "event.connection";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>, // None for notifications
}

impl JsonRpcRequest {
    pub fn new(method: &str, params: Option<Value>, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(id.into()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub id: Value,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

/// Normalizes a JSON-RPC id so `1` and `"1"` correlate.
pub fn id_key(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Helper payload types

#[derive(Debug, Serialize)]
pub struct InitializeParams {
    pub device_name: String,
    pub client_version: String,
}

#[derive(Debug, Serialize)]
pub struct SendMessageParams<'a> {
    pub chat_jid: &'a str,
    pub content: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionParams {
    pub state: ConnectionState,
}

/// Decodes a helper notification into a [`ClientEvent`].
/// Unknown methods yield `Ok(None)`.
pub fn decode_event(notification: &JsonRpcRequest) -> serde_json::Result<Option<ClientEvent>> {
    let params = notification.params.clone().unwrap_or(Value::Null);
    let event = match notification.method.as_str() {
        EVENT_MESSAGE => ClientEvent::Message(serde_json::from_value::<InboundMessage>(params)?),
        EVENT_RECEIPT => ClientEvent::Receipt(serde_json::from_value::<Receipt>(params)?),
        EVENT_CONNECTION => {
            ClientEvent::Connection(serde_json::from_value::<ConnectionParams>(params)?.state)
        }
        _ => return Ok(None),
    };
    Ok(Some(event))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageType;
    use serde_json::json;

    #[test]
    fn decodes_message_notification() {
        let line = json!({
            "jsonrpc": "2.0",
            "method": "event.message",
            "params": {
                "id": "ABC",
                "chat_jid": "123@s.whatsapp.net",
                "sender_jid": "123@s.whatsapp.net",
                "timestamp": "2024-05-01T10:00:00Z",
                "message": { "image_message": { "mimetype": "image/jpeg" } }
            }
        });
        let request: JsonRpcRequest = serde_json::from_value(line).unwrap();

        match decode_event(&request).unwrap() {
            Some(ClientEvent::Message(inbound)) => {
                assert_eq!(inbound.normalize().message_type, MessageType::Image);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn decodes_connection_notification() {
        let request: JsonRpcRequest = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "method": EVENT_CONNECTION,
            "params": { "state": "logged_out" }
        }))
        .unwrap();
        assert!(request.id.is_none());
        assert!(matches!(
            decode_event(&request).unwrap(),
            Some(ClientEvent::Connection(ConnectionState::LoggedOut))
        ));
    }

    #[test]
    fn unknown_method_is_ignored() {
        let request: JsonRpcRequest =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "method": "event.presence" })).unwrap();
        assert!(decode_event(&request).unwrap().is_none());
    }

    #[test]
    fn numeric_and_string_ids_correlate() {
        assert_eq!(id_key(&json!(7)), id_key(&json!("7")));
    }
}
