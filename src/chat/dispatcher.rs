use super::{
    conversation::conversation_id,
    event::{ClientEvent, Delivery, HistoryItem, ServerEvent},
    rooms::{ConnectionHandle, RoomManager},
    store::{ChatError, MessageStore, DEFAULT_HISTORY_LIMIT},
};

/// Per-socket state the transport threads through every event.
pub struct Connection {
    pub handle: ConnectionHandle,
    user_id: Option<String>,
}

impl Connection {
    pub fn new(handle: ConnectionHandle) -> Self {
        Self { handle, user_id: None }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Orchestrates connection lifecycle events and message fan-out. One
/// instance per process, shared by every socket task; a failing handler
/// answers the originating connection and touches nothing else.
#[derive(Clone)]
pub struct Dispatcher {
    store: MessageStore,
    rooms: RoomManager,
}

impl Dispatcher {
    pub fn new(store: MessageStore, rooms: RoomManager) -> Self {
        Self { store, rooms }
    }

    pub async fn handle_event(&self, conn: &mut Connection, event: ClientEvent) {
        match event {
            ClientEvent::Register { user_id } => self.register(conn, user_id).await,
            ClientEvent::LoadConversation { user1_id, user2_id } => {
                self.load_conversation(conn, &user1_id, &user2_id).await
            }
            ClientEvent::SendMessage { user1_id, user2_id, text, sender_name } => {
                self.send_message(conn, &user1_id, &user2_id, &text, &sender_name).await
            }
        }
    }

    /// Joins the connection to its personal room. Re-registering with the
    /// same id is a no-op; a different id replaces the previous identity,
    /// moving the personal-room membership with it. Conversation rooms the
    /// connection already joined are unaffected.
    async fn register(&self, conn: &mut Connection, user_id: String) {
        if user_id.is_empty() {
            tracing::warn!("register called without user_id");
            return;
        }
        if let Some(previous) = &conn.user_id {
            if *previous == user_id {
                return;
            }
            self.rooms.leave(previous, conn.handle.id).await;
        }
        self.rooms.join(&user_id, &conn.handle).await;
        tracing::debug!(%user_id, "joined personal room");
        conn.user_id = Some(user_id);
    }

    /// Joins the conversation room, then replies with the stored history to
    /// the requesting connection only.
    async fn load_conversation(&self, conn: &Connection, user1_id: &str, user2_id: &str) {
        if user1_id.is_empty() || user2_id.is_empty() {
            conn.handle.send(&ServerEvent::error("missing user1_id or user2_id"));
            return;
        }
        let conv_id = conversation_id(user1_id, user2_id);
        self.rooms.join(&conv_id, &conn.handle).await;

        match self.store.history(user1_id, user2_id, DEFAULT_HISTORY_LIMIT).await {
            Ok(messages) => conn.handle.send(&ServerEvent::ConversationHistory {
                messages: messages.iter().map(HistoryItem::from).collect(),
                conversation_id: conv_id,
            }),
            Err(err) => {
                tracing::error!(conversation = %conv_id, %err, "history load failed");
                conn.handle.send(&ServerEvent::error("failed to load conversation"));
            }
        }
    }

    /// Validates, persists, then fans out to the conversation room and the
    /// recipient's personal room. A message that fails to persist is never
    /// broadcast; a recipient with no live connection is not an error, the
    /// message surfaces on their next history load.
    async fn send_message(
        &self,
        conn: &Connection,
        user1_id: &str,
        user2_id: &str,
        text: &str,
        sender_name: &str,
    ) {
        if user1_id.is_empty() || user2_id.is_empty() || text.trim().is_empty() {
            conn.handle.send(&ServerEvent::error("missing user1_id, user2_id, or text"));
            return;
        }
        let conv_id = conversation_id(user1_id, user2_id);

        let message = match self.store.append(user1_id, sender_name, user2_id, text).await {
            Ok(message) => message,
            Err(err @ ChatError::Validation(_)) => {
                conn.handle.send(&ServerEvent::error(err.to_string()));
                return;
            }
            Err(err) => {
                tracing::error!(conversation = %conv_id, %err, "message append failed");
                conn.handle.send(&ServerEvent::error("failed to store message"));
                return;
            }
        };

        let event = ServerEvent::ReceiveMessage(Delivery::new(&message, conv_id.clone()));
        let Ok(payload) = serde_json::to_string(&event) else {
            return;
        };
        let delivered = self.rooms.broadcast_unique(&[&conv_id, user2_id], &payload).await;
        if delivered == 0 {
            tracing::debug!(conversation = %conv_id, "no live subscribers, stored only");
        }
    }

    /// Transport-level disconnect hook; must run on every socket close so
    /// dead connections never linger in the room table.
    pub async fn disconnect(&self, conn: &Connection) {
        self.rooms.disconnect(conn.handle.id).await;
    }
}
