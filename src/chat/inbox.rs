use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::{serde::rfc3339, OffsetDateTime};

use crate::{identity::IdentityResolver, AppResult};

use super::{conversation::conversation_id, store::{MessageStore, DEFAULT_HISTORY_LIMIT}};

#[derive(Deserialize)]
pub(crate) struct ConversationsQuery {
    user_id: String,
}

#[derive(Serialize)]
struct ConversationSummary {
    conversation_id: String,
    peer_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    peer_name: Option<String>,
    last_message: String,
    #[serde(with = "rfc3339")]
    timestamp: OffsetDateTime,
}

/// A user's conversations, most recently active first, each with its last
/// message and the peer's display name when the resolver knows it.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn conversations(
    State(store): State<MessageStore>,
    State(identity): State<Arc<dyn IdentityResolver>>,
    Query(ConversationsQuery { user_id }): Query<ConversationsQuery>,
) -> AppResult<Response> {
    let latest = store.latest_per_conversation(&user_id).await?;

    let mut conversations = Vec::with_capacity(latest.len());
    for msg in latest {
        let peer_id = if msg.sender_id == user_id {
            msg.recipient_id.clone()
        } else {
            msg.sender_id.clone()
        };
        let peer_name = identity.resolve(&peer_id).await?.map(|user| user.name);
        conversations.push(ConversationSummary {
            conversation_id: conversation_id(&user_id, &peer_id),
            peer_id,
            peer_name,
            timestamp: msg.timestamp(),
            last_message: msg.text,
        });
    }

    Ok(Json(json!({ "conversations": conversations })).into_response())
}

#[derive(Deserialize)]
pub(crate) struct MessagesQuery {
    user1: Option<String>,
    user2: Option<String>,
}

#[derive(Serialize)]
struct StoredMessage {
    id: String,
    sender_id: String,
    sender_name: String,
    recipient_id: String,
    text: String,
    #[serde(with = "rfc3339")]
    timestamp: OffsetDateTime,
}

/// Stored messages between two users, chronological.
#[debug_handler(state = crate::AppState)]
pub(crate) async fn messages(
    State(store): State<MessageStore>,
    Query(MessagesQuery { user1, user2 }): Query<MessagesQuery>,
) -> AppResult<Response> {
    let (Some(user1), Some(user2)) = (user1, user2) else {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "provide user1 and user2 query params" })),
        )
            .into_response());
    };

    let messages: Vec<StoredMessage> = store
        .history(&user1, &user2, DEFAULT_HISTORY_LIMIT)
        .await?
        .into_iter()
        .map(|msg| StoredMessage {
            timestamp: msg.timestamp(),
            id: msg.id,
            sender_id: msg.sender_id,
            sender_name: msg.sender_name,
            recipient_id: msg.recipient_id,
            text: msg.text,
        })
        .collect();

    Ok(Json(json!({ "count": messages.len(), "messages": messages })).into_response())
}
