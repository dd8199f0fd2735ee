//! Database schema and types

use crate::llm::ToolCallRequest;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS chats (
    id TEXT PRIMARY KEY,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_chats_created ON chats(created_at DESC);

CREATE TABLE IF NOT EXISTS messages (
    message_id TEXT PRIMARY KEY,
    chat_id TEXT NOT NULL,
    sequence_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    content TEXT,
    tool_payload TEXT,
    created_at TEXT NOT NULL,

    FOREIGN KEY (chat_id) REFERENCES chats(id)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_chat_seq ON messages(chat_id, sequence_id);
";

/// Chat record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chat {
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Message role
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    Tool,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            "tool" => Ok(MessageRole::Tool),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Structured tool data attached to a message.
///
/// Assistant messages carry the calls they issued; tool messages carry the
/// identity of the call they answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ToolPayload {
    Calls {
        calls: Vec<ToolCallRequest>,
    },
    Result {
        tool_call_id: String,
        name: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A message about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: Option<String>,
    pub tool_payload: Option<ToolPayload>,
}

impl NewMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: Some(text.into()),
            tool_payload: None,
        }
    }

    /// Assistant reply. Calls are attached only when the reply issued any.
    pub fn assistant(text: impl Into<String>, calls: Vec<ToolCallRequest>) -> Self {
        let tool_payload = if calls.is_empty() {
            None
        } else {
            Some(ToolPayload::Calls { calls })
        };
        Self {
            role: MessageRole::Assistant,
            content: Some(text.into()),
            tool_payload,
        }
    }

    pub fn tool(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
        is_error: bool,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: Some(content.into()),
            tool_payload: Some(ToolPayload::Result {
                tool_call_id: tool_call_id.into(),
                name: name.into(),
                is_error,
            }),
        }
    }

    /// Check role/content/payload consistency
    pub fn validate(&self) -> Result<(), String> {
        validate_shape(self.role, self.content.as_deref(), self.tool_payload.as_ref())
    }
}

/// Message record
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Message {
    pub message_id: String,
    pub chat_id: String,
    pub sequence_id: i64,
    pub role: MessageRole,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_payload: Option<ToolPayload>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Tool calls issued by this message, if it is an assistant message that issued any
    pub fn tool_calls(&self) -> &[ToolCallRequest] {
        match &self.tool_payload {
            Some(ToolPayload::Calls { calls }) => calls,
            _ => &[],
        }
    }
}

pub(crate) fn validate_shape(
    role: MessageRole,
    content: Option<&str>,
    payload: Option<&ToolPayload>,
) -> Result<(), String> {
    match (role, content, payload) {
        (MessageRole::User, Some(_), None) => Ok(()),
        (MessageRole::User, None, _) => Err("user message without content".to_string()),
        (MessageRole::User, Some(_), Some(_)) => {
            Err("user message with tool payload".to_string())
        }
        (MessageRole::Assistant, _, None | Some(ToolPayload::Calls { .. })) => Ok(()),
        (MessageRole::Assistant, _, Some(ToolPayload::Result { .. })) => {
            Err("assistant message with tool result payload".to_string())
        }
        (MessageRole::Tool, _, Some(ToolPayload::Result { .. })) => Ok(()),
        (MessageRole::Tool, _, _) => Err("tool message without result payload".to_string()),
    }
}
