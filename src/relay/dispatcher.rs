//! Tool-call dispatch
//!
//! Runs each requested call against the capability registry, in order, and
//! turns every outcome (including failures) into a structured result.

use crate::db::{MessageRole, NewMessage};
use crate::llm::{ToolCallRequest, ToolDefinition};
use crate::tools::{CapabilityError, ToolRegistry};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Why a call produced no output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownCapability,
    InvalidArguments,
    ExecutionFailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { output: Value },
    Error { kind: ToolErrorKind, message: String },
}

/// Result of one call, ready to append as a `tool` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    pub tool_call_id: String,
    pub name: String,
    pub role: MessageRole,
    pub outcome: ToolOutcome,
}

impl ToolCallResult {
    fn new(call: &ToolCallRequest, outcome: ToolOutcome) -> Self {
        Self {
            tool_call_id: call.id.clone(),
            name: call.name.clone(),
            role: MessageRole::Tool,
            outcome,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error { .. })
    }

    /// Text handed back to the model
    pub fn content(&self) -> String {
        match &self.outcome {
            ToolOutcome::Success { output } => match output {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            },
            ToolOutcome::Error { kind, message } => {
                json!({ "error": kind, "message": message }).to_string()
            }
        }
    }

    pub fn to_new_message(&self) -> NewMessage {
        NewMessage::tool(
            self.tool_call_id.clone(),
            self.name.clone(),
            self.content(),
            self.is_error(),
        )
    }
}

/// Executes tool calls through a capability registry
pub struct ToolDispatcher {
    registry: ToolRegistry,
}

impl ToolDispatcher {
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.registry.definitions()
    }

    /// One result per call, in call order. A failing call never affects its siblings.
    pub async fn dispatch(&self, calls: &[ToolCallRequest]) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(calls.len());

        for call in calls {
            let Some(capability) = self.registry.get(&call.name) else {
                tracing::warn!(tool = %call.name, id = %call.id, "Unknown capability requested");
                results.push(ToolCallResult::new(
                    call,
                    ToolOutcome::Error {
                        kind: ToolErrorKind::UnknownCapability,
                        message: format!("Unknown capability: {}", call.name),
                    },
                ));
                continue;
            };

            let outcome = match capability.run(call.arguments.clone()).await {
                Ok(output) => ToolOutcome::Success { output },
                Err(CapabilityError::InvalidArguments(message)) => ToolOutcome::Error {
                    kind: ToolErrorKind::InvalidArguments,
                    message,
                },
                Err(CapabilityError::Failed(message)) => ToolOutcome::Error {
                    kind: ToolErrorKind::ExecutionFailed,
                    message,
                },
            };

            tracing::debug!(
                tool = %call.name,
                id = %call.id,
                success = matches!(outcome, ToolOutcome::Success { .. }),
                "Tool call dispatched"
            );
            results.push(ToolCallResult::new(call, outcome));
        }

        results
    }
}
