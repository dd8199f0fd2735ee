//! Stream relay executor
//!
//! Drives the pure state machine for one streaming request: pulls provider
//! chunks, performs effects, and feeds effect outcomes back in as events.

use super::{ToolCallResult, ToolDispatcher, TranscriptStore};
use crate::db::NewMessage;
use crate::llm::{ChunkStream, ToolCallRequest};
use crate::state_machine::{transition, ClientEvent, RelayEffect, RelayEvent, RelayState};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Relays one provider stream to one client
pub struct StreamRelay<S> {
    chat_id: String,
    store: S,
    dispatcher: Arc<ToolDispatcher>,
    events: mpsc::Sender<ClientEvent>,
}

impl<S: TranscriptStore> StreamRelay<S> {
    pub fn new(
        chat_id: String,
        store: S,
        dispatcher: Arc<ToolDispatcher>,
        events: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            chat_id,
            store,
            dispatcher,
            events,
        }
    }

    /// Run until a terminal state and return it
    pub async fn run(self, stream: ChunkStream) -> RelayState {
        let mut state = RelayState::Open;
        let mut provider = Some(stream);
        let mut pending: VecDeque<RelayEvent> = VecDeque::new();

        loop {
            let event = if let Some(event) = pending.pop_front() {
                event
            } else if state.is_terminal() {
                break;
            } else if let Some(chunks) = provider.as_mut() {
                tokio::select! {
                    biased;
                    () = self.events.closed() => RelayEvent::ClientDisconnected,
                    item = chunks.next() => match item {
                        Some(Ok(chunk)) => RelayEvent::Chunk(chunk),
                        Some(Err(e)) => RelayEvent::ProviderFailed { message: e.message },
                        None => RelayEvent::ProviderFailed {
                            message: "Provider stream ended without completing".to_string(),
                        },
                    },
                }
            } else {
                tracing::warn!(
                    chat_id = %self.chat_id,
                    state = state.name(),
                    "Relay stalled without provider or pending events"
                );
                break;
            };

            let result = match transition(&state, event) {
                Ok(result) => result,
                Err(e) => {
                    tracing::warn!(chat_id = %self.chat_id, error = %e, "Rejected relay event");
                    continue;
                }
            };

            if let (RelayState::Streaming { accumulator }, RelayState::Failed { .. }) =
                (&state, &result.new_state)
            {
                tracing::debug!(
                    chat_id = %self.chat_id,
                    discarded_chars = accumulator.text.len(),
                    tool_call_in_progress = accumulator.tool_call_in_progress(),
                    "Discarding partial reply"
                );
            }
            if result.new_state.name() != state.name() {
                tracing::debug!(
                    chat_id = %self.chat_id,
                    from = state.name(),
                    to = result.new_state.name(),
                    "Relay state change"
                );
            }
            state = result.new_state;

            for effect in result.effects {
                match effect {
                    RelayEffect::Emit(event) => self.emit(event).await,
                    RelayEffect::ReleaseProvider => provider = None,
                    RelayEffect::PersistTurn { text, tool_calls } => {
                        pending.push_back(self.persist_turn(text, tool_calls).await);
                    }
                }
            }
        }

        match &state {
            RelayState::Failed { message } => {
                tracing::warn!(chat_id = %self.chat_id, error = %message, "Relay failed");
            }
            _ => tracing::info!(chat_id = %self.chat_id, "Relay completed"),
        }
        state
    }

    async fn emit(&self, event: ClientEvent) {
        let name = event.event_name();
        let is_final = event.is_final();
        if self.events.send(event).await.is_err() {
            tracing::debug!(chat_id = %self.chat_id, event = name, "Client gone, event dropped");
        } else if is_final {
            tracing::debug!(chat_id = %self.chat_id, event = name, "Final event sent");
        }
    }

    /// Dispatch the calls, then write the assistant reply and all results atomically
    async fn persist_turn(&self, text: String, tool_calls: Vec<ToolCallRequest>) -> RelayEvent {
        let results = self.dispatcher.dispatch(&tool_calls).await;

        let mut batch = Vec::with_capacity(results.len() + 1);
        batch.push(NewMessage::assistant(text, tool_calls));
        batch.extend(results.iter().map(ToolCallResult::to_new_message));

        match self.store.append_messages(&self.chat_id, &batch).await {
            Ok(stored) => {
                tracing::debug!(
                    chat_id = %self.chat_id,
                    messages = stored.len(),
                    tool_results = results.len(),
                    "Turn persisted"
                );
                RelayEvent::Persisted
            }
            Err(e) => RelayEvent::PersistFailed {
                message: format!("Failed to save reply: {e}"),
            },
        }
    }
}
