//! Common types for LLM interactions

use super::LlmError;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// LLM request
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub system: String,
    pub messages: Vec<LlmMessage>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Message role as seen by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmRole {
    User,
    Assistant,
    Tool,
}

/// Message in conversation
#[derive(Debug, Clone, PartialEq)]
pub struct LlmMessage {
    pub role: LlmRole,
    pub content: Option<String>,
    /// Calls issued by an assistant message
    pub tool_calls: Vec<ToolCallRequest>,
    /// Call answered by a tool message
    pub tool_call_id: Option<String>,
}

impl LlmMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: LlmRole::User,
            content: Some(text.into()),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn assistant(text: Option<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self {
            role: LlmRole::Assistant,
            content: text,
            tool_calls,
            tool_call_id: None,
        }
    }

    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: LlmRole::Tool,
            content: Some(content.into()),
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
        }
    }
}

/// Tool definition
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// A structured function invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallRequest {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One classified unit of provider output.
///
/// `Terminal` is an explicit sentinel: a stream that simply ends without it
/// did not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    Content(String),
    ToolCalls(Vec<ToolCallRequest>),
    Terminal,
}

/// Lazy, single-consumer sequence of provider chunks
pub type ChunkStream = BoxStream<'static, Result<StreamChunk, LlmError>>;
