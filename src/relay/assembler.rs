//! Conversation assembly
//!
//! Builds the provider message list from stored history plus the new user
//! message, persisting the user message first.

use super::{RelayError, TranscriptStore};
use crate::db::{Message, MessageRole, NewMessage, ToolPayload};
use crate::llm::LlmMessage;
use std::collections::HashSet;

pub struct ConversationAssembler<S> {
    store: S,
    history_limit: Option<usize>,
}

impl<S: TranscriptStore> ConversationAssembler<S> {
    pub fn new(store: S, history_limit: Option<usize>) -> Self {
        Self {
            store,
            history_limit,
        }
    }

    /// Stored history (oldest first) followed by `user_text`.
    ///
    /// The user message is written before returning. Any store failure
    /// aborts assembly; a partial history is never returned.
    pub async fn assemble(
        &self,
        chat_id: &str,
        user_text: &str,
    ) -> Result<Vec<LlmMessage>, RelayError> {
        self.store.get_chat(chat_id).await?;

        let stored = match self.history_limit {
            Some(limit) => self.store.list_recent_messages(chat_id, limit).await?,
            None => self.store.list_messages(chat_id).await?,
        };
        let history = drop_orphaned_tool_results(stored);

        self.store
            .append_message(chat_id, &NewMessage::user(user_text))
            .await?;

        let mut messages: Vec<LlmMessage> = history.iter().map(to_llm_message).collect();
        messages.push(LlmMessage::user(user_text));

        tracing::debug!(
            chat_id,
            history = history.len(),
            "Assembled conversation"
        );
        Ok(messages)
    }
}

/// Keep a tool result only if an earlier assistant message in the window
/// issued its call and nothing answered it yet. A capped window can start
/// midway through a tool exchange.
fn drop_orphaned_tool_results(messages: Vec<Message>) -> Vec<Message> {
    let total = messages.len();
    let mut open: HashSet<String> = HashSet::new();
    let kept: Vec<Message> = messages
        .into_iter()
        .filter(|m| match (&m.role, &m.tool_payload) {
            (MessageRole::Tool, Some(ToolPayload::Result { tool_call_id, .. })) => {
                open.remove(tool_call_id)
            }
            (MessageRole::Tool, _) => false,
            (_, Some(ToolPayload::Calls { calls })) => {
                open.extend(calls.iter().map(|c| c.id.clone()));
                true
            }
            _ => true,
        })
        .collect();

    if kept.len() < total {
        tracing::debug!(dropped = total - kept.len(), "Dropped orphaned tool results");
    }
    kept
}

pub(crate) fn to_llm_message(message: &Message) -> LlmMessage {
    match message.role {
        MessageRole::User => LlmMessage::user(message.content.clone().unwrap_or_default()),
        MessageRole::Assistant => {
            LlmMessage::assistant(message.content.clone(), message.tool_calls().to_vec())
        }
        MessageRole::Tool => {
            let tool_call_id = match &message.tool_payload {
                Some(ToolPayload::Result { tool_call_id, .. }) => tool_call_id.clone(),
                _ => String::new(),
            };
            LlmMessage::tool(tool_call_id, message.content.clone().unwrap_or_default())
        }
    }
}
