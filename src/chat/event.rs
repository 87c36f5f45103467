use serde::{Deserialize, Serialize};
use time::{serde::rfc3339, OffsetDateTime};

use super::store::Message;

fn default_sender_name() -> String {
    "Unknown".to_owned()
}

/// Inbound socket events; `{"event": <name>, "data": {...}}` on the wire.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Register {
        #[serde(default)]
        user_id: String,
    },
    LoadConversation {
        #[serde(default)]
        user1_id: String,
        #[serde(default)]
        user2_id: String,
    },
    SendMessage {
        #[serde(default)]
        user1_id: String,
        #[serde(default)]
        user2_id: String,
        #[serde(default)]
        text: String,
        #[serde(default = "default_sender_name")]
        sender_name: String,
    },
}

/// Outbound socket events, same envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    ConversationHistory {
        conversation_id: String,
        messages: Vec<HistoryItem>,
    },
    ReceiveMessage(Delivery),
    Error { msg: String },
}

impl ServerEvent {
    pub fn error(msg: impl Into<String>) -> Self {
        Self::Error { msg: msg.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    #[serde(with = "rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl From<&Message> for HistoryItem {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id.clone(),
            sender_id: msg.sender_id.clone(),
            sender_name: msg.sender_name.clone(),
            text: msg.text.clone(),
            timestamp: msg.timestamp(),
        }
    }
}

/// Fan-out payload: the persisted record plus the room it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub id: String,
    pub conversation_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub text: String,
    #[serde(with = "rfc3339")]
    pub timestamp: OffsetDateTime,
}

impl Delivery {
    pub fn new(msg: &Message, conversation_id: String) -> Self {
        Self {
            id: msg.id.clone(),
            conversation_id,
            sender_id: msg.sender_id.clone(),
            sender_name: msg.sender_name.clone(),
            text: msg.text.clone(),
            timestamp: msg.timestamp(),
        }
    }
}
