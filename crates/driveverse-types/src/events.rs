use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::MessageResponse;
use crate::models::MessageKind;

/// Message shown to a client whose account was just blocked.
pub const ACCOUNT_BLOCKED_NOTICE: &str = "Your account has been blocked by an administrator";

/// Events sent over the WebSocket gateway, server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GatewayEvent {
    /// Connection authenticated; the client should now announce itself.
    Ready { user_id: Uuid },

    /// A message posted to a chat room. Delivered to every member of the room,
    /// the sender included.
    ReceiveMessage {
        #[serde(flatten)]
        message: MessageResponse,
        receiver_id: Uuid,
    },

    /// Lightweight badge hint for the receiver's personal room.
    NewNotification {
        chat_id: Uuid,
        sender_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// The receiver's inbox entry for this chat changed.
    ChatUpdated {
        chat_id: Uuid,
        sender_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Read receipt for a message.
    MessageSeen {
        chat_id: Uuid,
        message_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// Forces the client to log out.
    AccountBlocked { message: String },
}

/// Commands sent FROM client TO server over WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GatewayCommand {
    /// Announce the connection's user id and join the personal room.
    /// An empty id is ignored.
    RegisterUser { user_id: String },

    /// Join a chat's shared room.
    JoinChat { chat_id: Uuid },

    /// Relay an already-persisted message to the chat room.
    SendMessage {
        chat_id: Uuid,
        receiver_id: Uuid,
        #[serde(default)]
        sender: Option<Uuid>,
        id: Uuid,
        content: String,
        #[serde(rename = "type", default)]
        kind: MessageKind,
        #[serde(default)]
        created_at: Option<DateTime<Utc>>,
    },

    /// Acknowledge that a message was seen.
    MarkSeen {
        chat_id: Uuid,
        message_id: Uuid,
        #[serde(default)]
        sender_id: Option<Uuid>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_camel_case_wire_names() {
        let chat_id = Uuid::new_v4();
        let raw = format!(r#"{{"type":"joinChat","data":{{"chatId":"{chat_id}"}}}}"#);
        let cmd: GatewayCommand = serde_json::from_str(&raw).unwrap();
        assert_eq!(cmd, GatewayCommand::JoinChat { chat_id });

        let raw = r#"{"type":"registerUser","data":{"userId":""}}"#;
        let cmd: GatewayCommand = serde_json::from_str(raw).unwrap();
        assert_eq!(cmd, GatewayCommand::RegisterUser { user_id: String::new() });
    }

    #[test]
    fn receive_message_flattens_payload() {
        let message = MessageResponse {
            id: Uuid::new_v4(),
            chat_id: Uuid::new_v4(),
            sender: Uuid::new_v4(),
            content: "hello".into(),
            kind: MessageKind::Text,
            seen: false,
            created_at: Utc::now(),
        };
        let receiver_id = Uuid::new_v4();
        let event = GatewayEvent::ReceiveMessage { message: message.clone(), receiver_id };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "receiveMessage");
        assert_eq!(json["data"]["content"], "hello");
        assert_eq!(json["data"]["type"], "text");
        assert_eq!(json["data"]["receiverId"], receiver_id.to_string());
        assert_eq!(json["data"]["chatId"], message.chat_id.to_string());
    }
}
