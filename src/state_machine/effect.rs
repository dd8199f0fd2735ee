//! Effects produced by relay transitions

use crate::llm::ToolCallRequest;
use serde::{Deserialize, Serialize};

/// Client-facing stream event, serialized as `{"type": ..., "payload": ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A single content fragment, not the cumulative text
    Content(String),
    ToolCalls(Vec<ToolCallRequest>),
    /// Full accumulated text
    Done(String),
    Error(String),
}

impl ClientEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientEvent::Content(_) => "content",
            ClientEvent::ToolCalls(_) => "tool_calls",
            ClientEvent::Done(_) => "done",
            ClientEvent::Error(_) => "error",
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ClientEvent::Done(_) | ClientEvent::Error(_))
    }
}

/// Effects to be executed after a transition
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEffect {
    /// Send an event to the client
    Emit(ClientEvent),

    /// Drop the provider stream
    ReleaseProvider,

    /// Dispatch the calls, then write the assistant message and tool results
    /// in one transaction. Outcome comes back as `Persisted`/`PersistFailed`.
    PersistTurn {
        text: String,
        tool_calls: Vec<ToolCallRequest>,
    },
}
