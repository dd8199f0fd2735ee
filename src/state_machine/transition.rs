//! Pure state transition function

use super::{Accumulator, ClientEvent, RelayEffect, RelayEvent, RelayState};
use crate::llm::StreamChunk;
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: RelayState,
    pub effects: Vec<RelayEffect>,
}

impl TransitionResult {
    pub fn new(state: RelayState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: RelayEffect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("Relay already terminated in state {0}")]
    AlreadyTerminated(&'static str),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function.
///
/// Given the same state and event it always yields the same result and
/// performs no I/O.
pub fn transition(
    state: &RelayState,
    event: RelayEvent,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ==================== Chunk classification ====================
        (RelayState::Open | RelayState::Streaming { .. }, RelayEvent::Chunk(chunk)) => {
            let mut accumulator = match state {
                RelayState::Streaming { accumulator } => accumulator.clone(),
                _ => Accumulator::default(),
            };

            match chunk {
                StreamChunk::Content(fragment) => {
                    accumulator.text.push_str(&fragment);
                    Ok(TransitionResult::new(RelayState::Streaming { accumulator })
                        .with_effect(RelayEffect::Emit(ClientEvent::Content(fragment))))
                }
                StreamChunk::ToolCalls(calls) => {
                    accumulator.tool_calls.extend(calls.iter().cloned());
                    Ok(TransitionResult::new(RelayState::Streaming { accumulator })
                        .with_effect(RelayEffect::Emit(ClientEvent::ToolCalls(calls))))
                }
                StreamChunk::Terminal => {
                    let Accumulator { text, tool_calls } = accumulator;
                    Ok(TransitionResult::new(RelayState::Closing { text: text.clone() })
                        .with_effect(RelayEffect::ReleaseProvider)
                        .with_effect(RelayEffect::PersistTurn { text, tool_calls }))
                }
            }
        }

        (RelayState::Closing { .. }, RelayEvent::Chunk(_)) => Err(
            TransitionError::InvalidTransition("chunk received after terminal".to_string()),
        ),

        // ==================== Completion ====================
        (RelayState::Closing { text }, RelayEvent::Persisted) => {
            Ok(TransitionResult::new(RelayState::Closed)
                .with_effect(RelayEffect::Emit(ClientEvent::Done(text.clone()))))
        }

        (RelayState::Open | RelayState::Streaming { .. }, RelayEvent::Persisted) => Err(
            TransitionError::InvalidTransition("persisted before terminal".to_string()),
        ),

        (RelayState::Open | RelayState::Streaming { .. }, RelayEvent::PersistFailed { .. }) => {
            Err(TransitionError::InvalidTransition(
                "persist failure before terminal".to_string(),
            ))
        }

        // ==================== Failure ====================
        (RelayState::Open | RelayState::Streaming { .. }, RelayEvent::ProviderFailed { message }) => {
            Ok(TransitionResult::new(RelayState::Failed {
                message: message.clone(),
            })
            .with_effect(RelayEffect::Emit(ClientEvent::Error(message)))
            .with_effect(RelayEffect::ReleaseProvider))
        }

        // Provider is already released while closing
        (
            RelayState::Closing { .. },
            RelayEvent::ProviderFailed { message } | RelayEvent::PersistFailed { message },
        ) => Ok(TransitionResult::new(RelayState::Failed {
            message: message.clone(),
        })
        .with_effect(RelayEffect::Emit(ClientEvent::Error(message)))),

        // Nobody is left to tell
        (RelayState::Open | RelayState::Streaming { .. }, RelayEvent::ClientDisconnected) => {
            Ok(TransitionResult::new(RelayState::Failed {
                message: "client disconnected".to_string(),
            })
            .with_effect(RelayEffect::ReleaseProvider))
        }

        (RelayState::Closing { .. }, RelayEvent::ClientDisconnected) => {
            Ok(TransitionResult::new(RelayState::Failed {
                message: "client disconnected".to_string(),
            }))
        }

        (RelayState::Closed | RelayState::Failed { .. }, _) => {
            Err(TransitionError::AlreadyTerminated(state.name()))
        }
    }
}
