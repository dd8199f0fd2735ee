//! Transcript persistence
//!
//! Chats and their append-only message log, stored in `SQLite`.

mod schema;

pub use schema::*;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Chat not found: {0}")]
    ChatNotFound(String),
    #[error("Malformed message row {message_id}: {reason}")]
    MalformedRow { message_id: String, reason: String },
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        Self::init(conn)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> DbResult<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DbError::Unavailable("connection mutex poisoned".to_string()))
    }

    // ==================== Chat Operations ====================

    /// Create a new chat
    pub fn create_chat(&self) -> DbResult<Chat> {
        let conn = self.lock()?;
        let chat = Chat {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now().trunc_subsecs(6),
        };

        conn.execute(
            "INSERT INTO chats (id, created_at) VALUES (?1, ?2)",
            params![chat.id, format_datetime(&chat.created_at)],
        )?;

        Ok(chat)
    }

    /// Get chat by ID
    pub fn get_chat(&self, id: &str) -> DbResult<Chat> {
        let conn = self.lock()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT id, created_at FROM chats WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let (id, created_at) = row.ok_or_else(|| DbError::ChatNotFound(id.to_string()))?;
        chat_from_parts(id, &created_at)
    }

    /// List all chats, newest first
    pub fn list_chats(&self) -> DbResult<Vec<Chat>> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, created_at FROM chats ORDER BY created_at DESC, rowid DESC")?;

        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(id, created_at)| chat_from_parts(id, &created_at))
            .collect()
    }

    // ==================== Message Operations ====================

    /// Get all messages for a chat, oldest first
    pub fn list_messages(&self, chat_id: &str) -> DbResult<Vec<Message>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT message_id, chat_id, sequence_id, role, content, tool_payload, created_at
             FROM messages WHERE chat_id = ?1 ORDER BY sequence_id ASC",
        )?;

        let rows = stmt
            .query_map(params![chat_id], RawMessageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter().map(RawMessageRow::into_message).collect()
    }

    /// Get the most recent `limit` messages for a chat, oldest first
    pub fn list_recent_messages(&self, chat_id: &str, limit: usize) -> DbResult<Vec<Message>> {
        let conn = self.lock()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut stmt = conn.prepare(
            "SELECT message_id, chat_id, sequence_id, role, content, tool_payload, created_at
             FROM messages WHERE chat_id = ?1 ORDER BY sequence_id DESC LIMIT ?2",
        )?;

        let mut rows = stmt
            .query_map(params![chat_id, limit], RawMessageRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.reverse();

        rows.into_iter().map(RawMessageRow::into_message).collect()
    }

    /// Append one message to a chat
    pub fn append_message(&self, chat_id: &str, message: &NewMessage) -> DbResult<Message> {
        let mut appended = self.append_messages(chat_id, std::slice::from_ref(message))?;
        appended
            .pop()
            .ok_or_else(|| DbError::Unavailable("append returned no rows".to_string()))
    }

    /// Append several messages to a chat in a single transaction.
    ///
    /// Either every message is stored, in the given order, or none is.
    pub fn append_messages(&self, chat_id: &str, messages: &[NewMessage]) -> DbResult<Vec<Message>> {
        for message in messages {
            message.validate().map_err(DbError::InvalidMessage)?;
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS(SELECT 1 FROM chats WHERE id = ?1)",
            params![chat_id],
            |row| row.get(0),
        )?;
        if !exists {
            return Err(DbError::ChatNotFound(chat_id.to_string()));
        }

        let mut sequence_id: i64 = tx.query_row(
            "SELECT COALESCE(MAX(sequence_id), 0) FROM messages WHERE chat_id = ?1",
            params![chat_id],
            |row| row.get(0),
        )?;

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            sequence_id += 1;
            let now = Utc::now().trunc_subsecs(6);
            let message_id = uuid::Uuid::new_v4().to_string();
            let payload = message
                .tool_payload
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(|e| DbError::InvalidMessage(e.to_string()))?;

            tx.execute(
                "INSERT INTO messages (message_id, chat_id, sequence_id, role, content, tool_payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    message_id,
                    chat_id,
                    sequence_id,
                    message.role.to_string(),
                    message.content,
                    payload,
                    format_datetime(&now),
                ],
            )?;

            stored.push(Message {
                message_id,
                chat_id: chat_id.to_string(),
                sequence_id,
                role: message.role,
                content: message.content.clone(),
                tool_payload: message.tool_payload.clone(),
                created_at: now,
            });
        }

        tx.commit()?;
        Ok(stored)
    }
}

/// Untyped message row as read from `SQLite`, validated by `into_message`
struct RawMessageRow {
    message_id: String,
    chat_id: String,
    sequence_id: i64,
    role: String,
    content: Option<String>,
    tool_payload: Option<String>,
    created_at: String,
}

impl RawMessageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            message_id: row.get(0)?,
            chat_id: row.get(1)?,
            sequence_id: row.get(2)?,
            role: row.get(3)?,
            content: row.get(4)?,
            tool_payload: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_message(self) -> DbResult<Message> {
        let malformed = |reason: String| DbError::MalformedRow {
            message_id: self.message_id.clone(),
            reason,
        };

        let role: MessageRole = self.role.parse().map_err(malformed)?;
        let tool_payload = self
            .tool_payload
            .as_deref()
            .map(serde_json::from_str::<ToolPayload>)
            .transpose()
            .map_err(|e| malformed(format!("bad tool payload: {e}")))?;
        validate_shape(role, self.content.as_deref(), tool_payload.as_ref()).map_err(malformed)?;
        let created_at = parse_datetime(&self.created_at).map_err(malformed)?;

        Ok(Message {
            message_id: self.message_id,
            chat_id: self.chat_id,
            sequence_id: self.sequence_id,
            role,
            content: self.content,
            tool_payload,
            created_at,
        })
    }
}

fn chat_from_parts(id: String, created_at: &str) -> DbResult<Chat> {
    let created_at = parse_datetime(created_at).map_err(|reason| DbError::MalformedRow {
        message_id: id.clone(),
        reason,
    })?;
    Ok(Chat { id, created_at })
}

/// Fixed-width so that text ordering matches time ordering
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| format!("bad timestamp '{s}': {e}"))
}
