use sqlx::SqlitePool;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Cap on messages returned per conversation load, matching what a client
/// can reasonably render in one go.
pub const DEFAULT_HISTORY_LIMIT: u32 = 500;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("storage: {0}")]
    Storage(#[from] sqlx::Error),
}

/// A persisted chat message. Immutable once appended; `sender_name` is
/// denormalized at send time and never re-resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub text: String,
    /// Server-assigned creation time, unix milliseconds.
    pub timestamp_ms: i64,
}

impl Message {
    pub fn timestamp(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp_nanos(self.timestamp_ms as i128 * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

type MessageRow = (String, String, String, String, String, i64);

fn from_row((id, sender_id, sender_name, recipient_id, text, timestamp_ms): MessageRow) -> Message {
    Message { id, sender_id, sender_name, recipient_id, text, timestamp_ms }
}

/// Append-only store owning the `messages` table.
#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Persists a new message and returns it with its assigned id and
    /// timestamp. The timestamp is taken server-side and clamped in SQL to
    /// never fall below the store's current maximum, so append order and
    /// timestamp order agree even across wall-clock steps.
    pub async fn append(
        &self,
        sender_id: &str,
        sender_name: &str,
        recipient_id: &str,
        text: &str,
    ) -> Result<Message, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(ChatError::Validation("message text is empty".to_owned()));
        }

        let id = Uuid::now_v7().to_string();
        let now_ms = (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64;
        let (timestamp_ms,): (i64,) = sqlx::query_as(
            "INSERT INTO messages (id,sender_id,sender_name,recipient_id,text,timestamp) \
             VALUES (?,?,?,?,?,MAX(?,COALESCE((SELECT MAX(timestamp) FROM messages),0))) \
             RETURNING timestamp",
        )
        .bind(&id)
        .bind(sender_id)
        .bind(sender_name)
        .bind(recipient_id)
        .bind(text)
        .bind(now_ms)
        .fetch_one(&self.pool)
        .await?;

        Ok(Message {
            id,
            sender_id: sender_id.to_owned(),
            sender_name: sender_name.to_owned(),
            recipient_id: recipient_id.to_owned(),
            text: text.to_owned(),
            timestamp_ms,
        })
    }

    /// Both directions of a participant pair, ascending by timestamp with
    /// insertion order breaking ties, capped at `limit`.
    pub async fn history(
        &self,
        user_a: &str,
        user_b: &str,
        limit: u32,
    ) -> Result<Vec<Message>, ChatError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,sender_id,sender_name,recipient_id,text,timestamp FROM messages \
             WHERE (sender_id=? AND recipient_id=?) OR (sender_id=? AND recipient_id=?) \
             ORDER BY timestamp, seq LIMIT ?",
        )
        .bind(user_a)
        .bind(user_b)
        .bind(user_b)
        .bind(user_a)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(from_row).collect())
    }

    /// The newest message of each conversation involving `user_id`, most
    /// recently active conversation first.
    pub async fn latest_per_conversation(&self, user_id: &str) -> Result<Vec<Message>, ChatError> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            "SELECT id,sender_id,sender_name,recipient_id,text,timestamp FROM messages \
             WHERE seq IN ( \
                 SELECT MAX(seq) FROM messages \
                 WHERE sender_id=? OR recipient_id=? \
                 GROUP BY MIN(sender_id,recipient_id), MAX(sender_id,recipient_id) \
             ) \
             ORDER BY timestamp DESC, seq DESC",
        )
        .bind(user_id)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(from_row).collect())
    }
}
