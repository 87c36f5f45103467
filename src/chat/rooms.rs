use std::{collections::HashMap, sync::Arc};

use tokio::sync::{mpsc::{self, UnboundedReceiver, UnboundedSender}, Mutex};
use uuid::Uuid;

use super::event::ServerEvent;

pub type ConnId = Uuid;

/// Write half of one live connection. Everything addressed to the socket
/// goes through this channel and is drained into the sink by the
/// transport's forward task.
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: ConnId,
    tx: UnboundedSender<String>,
}

impl ConnectionHandle {
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id: Uuid::now_v7(), tx }, rx)
    }

    /// Reply to this connection only.
    pub fn send(&self, event: &ServerEvent) {
        if let Ok(text) = serde_json::to_string(event) {
            let _ = self.tx.send(text);
        }
    }
}

/// In-memory table of named rooms and their live members. Created once at
/// startup and handed to the dispatcher; nothing here survives a restart.
#[derive(Clone, Default)]
pub struct RoomManager {
    rooms: Arc<Mutex<HashMap<String, HashMap<ConnId, UnboundedSender<String>>>>>,
}

impl RoomManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent; the room is created on first join.
    pub async fn join(&self, room: &str, conn: &ConnectionHandle) {
        let mut rooms = self.rooms.lock().await;
        rooms.entry(room.to_owned()).or_default().insert(conn.id, conn.tx.clone());
    }

    pub async fn leave(&self, room: &str, conn_id: ConnId) {
        let mut rooms = self.rooms.lock().await;
        if let Some(members) = rooms.get_mut(room) {
            members.remove(&conn_id);
            if members.is_empty() {
                rooms.remove(room);
            }
        }
    }

    /// Drops the connection from every room. Runs from the transport's
    /// disconnect hook on every socket close.
    pub async fn disconnect(&self, conn_id: ConnId) {
        let mut rooms = self.rooms.lock().await;
        rooms.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    /// Best-effort delivery to the room's members at this moment; returns
    /// how many connections took the payload. An unknown or empty room
    /// delivers to nobody and is not an error.
    pub async fn broadcast(&self, room: &str, payload: &str) -> usize {
        let rooms = self.rooms.lock().await;
        let Some(members) = rooms.get(room) else {
            return 0;
        };
        members.values().filter(|tx| tx.send(payload.to_owned()).is_ok()).count()
    }

    /// Delivery to the union of the given rooms' members, at most one copy
    /// per connection even when it sits in several of them.
    pub async fn broadcast_unique(&self, targets: &[&str], payload: &str) -> usize {
        let rooms = self.rooms.lock().await;
        let mut recipients: HashMap<ConnId, &UnboundedSender<String>> = HashMap::new();
        for room in targets {
            if let Some(members) = rooms.get(*room) {
                for (id, tx) in members {
                    recipients.entry(*id).or_insert(tx);
                }
            }
        }
        recipients.values().filter(|tx| tx.send(payload.to_owned()).is_ok()).count()
    }
}
