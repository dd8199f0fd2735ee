//! Relay states

use crate::llm::ToolCallRequest;

/// Request-scoped response accumulator, owned by a single relay
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Accumulator {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl Accumulator {
    pub fn tool_call_in_progress(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// State of one streaming request
#[derive(Debug, Clone, PartialEq)]
pub enum RelayState {
    /// Nothing received, nothing sent
    Open,
    /// At least one chunk relayed
    Streaming { accumulator: Accumulator },
    /// Terminal chunk seen; turn is being persisted
    Closing { text: String },
    /// Turn persisted and `done` emitted
    Closed,
    /// Aborted; nothing persisted for the assistant
    Failed { message: String },
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RelayState::Closed | RelayState::Failed { .. })
    }

    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            RelayState::Open => "open",
            RelayState::Streaming { .. } => "streaming",
            RelayState::Closing { .. } => "closing",
            RelayState::Closed => "closed",
            RelayState::Failed { .. } => "failed",
        }
    }
}
