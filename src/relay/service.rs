//! Chat service
//!
//! Entry point for the HTTP layer: chat lifecycle, opening streams and
//! accepting externally-resolved tool results.

use super::{
    CompletionProvider, ConversationAssembler, DatabaseStore, RelayError, ServiceProvider,
    StreamRelay, ToolDispatcher, TranscriptStore,
};
use crate::config::RelayConfig;
use crate::db::{Chat, Message, NewMessage, ToolPayload};
use crate::llm::LlmRequest;
use crate::state_machine::ClientEvent;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Events buffered per stream before the relay waits on the client
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A tool result resolved outside the relay
#[derive(Debug, Clone, Deserialize)]
pub struct ExternalToolResult {
    pub tool_call_id: String,
    pub name: String,
    /// Strings are stored as-is, anything else as JSON text
    pub content: Value,
    #[serde(default)]
    pub is_error: bool,
}

impl ExternalToolResult {
    fn to_new_message(&self) -> NewMessage {
        let content = match &self.content {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        NewMessage::tool(
            self.tool_call_id.clone(),
            self.name.clone(),
            content,
            self.is_error,
        )
    }
}

pub struct ChatService<S, P> {
    store: S,
    provider: P,
    assembler: ConversationAssembler<S>,
    dispatcher: Arc<ToolDispatcher>,
    config: RelayConfig,
}

/// Service wired to `SQLite` and a live LLM
pub type ProductionChatService = ChatService<DatabaseStore, ServiceProvider>;

impl<S, P> ChatService<S, P>
where
    S: TranscriptStore + Clone + 'static,
    P: CompletionProvider,
{
    pub fn new(store: S, provider: P, dispatcher: ToolDispatcher, config: RelayConfig) -> Self {
        Self {
            assembler: ConversationAssembler::new(store.clone(), config.history_limit),
            store,
            provider,
            dispatcher: Arc::new(dispatcher),
            config,
        }
    }

    pub async fn create_chat(&self) -> Result<Chat, RelayError> {
        let chat = self.store.create_chat().await?;
        tracing::info!(chat_id = %chat.id, "Chat created");
        Ok(chat)
    }

    pub async fn list_chats(&self) -> Result<Vec<Chat>, RelayError> {
        Ok(self.store.list_chats().await?)
    }

    pub async fn get_messages(&self, chat_id: &str) -> Result<Vec<Message>, RelayError> {
        self.store.get_chat(chat_id).await?;
        Ok(self.store.list_messages(chat_id).await?)
    }

    /// Assemble the conversation, open the provider stream and start relaying.
    ///
    /// Failures here happen before any event is produced. Once the receiver is
    /// returned, every outcome arrives as a final `done` or `error` event.
    pub async fn open_stream(
        &self,
        chat_id: &str,
        text: &str,
    ) -> Result<mpsc::Receiver<ClientEvent>, RelayError> {
        if text.trim().is_empty() {
            return Err(RelayError::InvalidInput(
                "message must not be empty".to_string(),
            ));
        }

        let messages = self.assembler.assemble(chat_id, text).await?;
        let request = LlmRequest {
            system: self.config.system_prompt.clone(),
            messages,
            tools: self.dispatcher.definitions(),
            max_tokens: self.config.max_tokens,
        };

        let stream = self.provider.stream_completion(&request).await?;

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let relay = StreamRelay::new(
            chat_id.to_string(),
            self.store.clone(),
            Arc::clone(&self.dispatcher),
            tx,
        );
        tokio::spawn(relay.run(stream));

        tracing::info!(chat_id, "Stream opened");
        Ok(rx)
    }

    /// Persist tool results resolved by the client, all or none
    pub async fn submit_tool_results(
        &self,
        chat_id: &str,
        results: &[ExternalToolResult],
    ) -> Result<Vec<Message>, RelayError> {
        if results.is_empty() {
            return Err(RelayError::InvalidInput(
                "no tool results submitted".to_string(),
            ));
        }

        self.store.get_chat(chat_id).await?;
        let history = self.store.list_messages(chat_id).await?;
        check_tool_results(&history, results)?;

        let batch: Vec<NewMessage> = results
            .iter()
            .map(ExternalToolResult::to_new_message)
            .collect();
        let stored = self.store.append_messages(chat_id, &batch).await?;

        tracing::info!(chat_id, count = stored.len(), "Tool results submitted");
        Ok(stored)
    }
}

/// Each result must answer a call an assistant message issued in this chat,
/// once.
fn check_tool_results(
    history: &[Message],
    results: &[ExternalToolResult],
) -> Result<(), RelayError> {
    let mut issued = HashSet::new();
    let mut answered = HashSet::new();
    for message in history {
        match &message.tool_payload {
            Some(ToolPayload::Calls { calls }) => {
                issued.extend(calls.iter().map(|c| c.id.as_str()));
            }
            Some(ToolPayload::Result { tool_call_id, .. }) => {
                answered.insert(tool_call_id.as_str());
            }
            None => {}
        }
    }

    let mut seen = HashSet::new();
    for result in results {
        let id = result.tool_call_id.as_str();
        if !seen.insert(id) {
            return Err(RelayError::InvalidInput(format!(
                "duplicate result for tool call {id}"
            )));
        }
        if !issued.contains(id) {
            return Err(RelayError::InvalidInput(format!(
                "tool call {id} was not issued in this chat"
            )));
        }
        if answered.contains(id) {
            return Err(RelayError::InvalidInput(format!(
                "tool call {id} already has a result"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MessageRole, ToolPayload};
    use crate::llm::{LlmError, LlmErrorKind, LlmRole, StreamChunk, ToolCallRequest};
    use crate::relay::testing::{MockProvider, MockStore};
    use crate::tools::ToolRegistry;
    use serde_json::json;

    type TestService = ChatService<Arc<MockStore>, Arc<MockProvider>>;

    fn service() -> (TestService, Arc<MockStore>, Arc<MockProvider>) {
        let store = Arc::new(MockStore::new());
        let provider = Arc::new(MockProvider::new());
        let service = ChatService::new(
            Arc::clone(&store),
            Arc::clone(&provider),
            ToolDispatcher::new(ToolRegistry::standard()),
            RelayConfig::default(),
        );
        (service, store, provider)
    }

    async fn collect(mut rx: mpsc::Receiver<ClientEvent>) -> Vec<ClientEvent> {
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_tokyo_apartment_scenario() {
        let (service, store, provider) = service();
        let chat = service.create_chat().await.unwrap();
        provider.queue_text(&["Sure, ", "let me check."]);

        let text = "find me an apartment in Tokyo under ¥100,000/month";
        let rx = service.open_stream(&chat.id, text).await.unwrap();

        assert_eq!(
            collect(rx).await,
            vec![
                ClientEvent::Content("Sure, ".into()),
                ClientEvent::Content("let me check.".into()),
                ClientEvent::Done("Sure, let me check.".into()),
            ]
        );

        let stored = store.messages_for(&chat.id);
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].role, MessageRole::User);
        assert_eq!(stored[0].content.as_deref(), Some(text));
        assert_eq!(stored[1].role, MessageRole::Assistant);
        assert_eq!(stored[1].content.as_deref(), Some("Sure, let me check."));

        let requests = provider.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].system.contains("real estate"));
        assert_eq!(requests[0].tools[0].name, "search_properties");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_user_message_only() {
        let (service, store, provider) = service();
        let chat = service.create_chat().await.unwrap();
        provider.queue_stream(vec![
            Ok(StreamChunk::Content("Sure".into())),
            Err(LlmError::network("connection reset")),
        ]);

        let rx = service.open_stream(&chat.id, "hi").await.unwrap();
        let events = collect(rx).await;

        assert_eq!(events.last(), Some(&ClientEvent::Error("connection reset".into())));
        assert_eq!(events.iter().filter(|e| e.is_final()).count(), 1);

        let stored = store.messages_for(&chat.id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].role, MessageRole::User);
    }

    #[tokio::test]
    async fn test_open_errors_happen_before_stream() {
        let (service, store, provider) = service();

        let err = service.open_stream("missing", "hi").await.unwrap_err();
        assert!(matches!(err, RelayError::ChatNotFound(_)));

        let chat = service.create_chat().await.unwrap();
        let err = service.open_stream(&chat.id, "   ").await.unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));

        provider.queue_open_error(LlmError::rate_limit("Rate limit exceeded: slow down"));
        let err = service.open_stream(&chat.id, "hi").await.unwrap_err();
        assert!(matches!(err, RelayError::Provider(ref e) if e.kind == LlmErrorKind::RateLimit));

        // Input survives the provider failure
        let stored = store.messages_for(&chat.id);
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content.as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_follow_up_turn_sees_tool_results() {
        let (service, _store, provider) = service();
        let chat = service.create_chat().await.unwrap();
        let call = ToolCallRequest::new("c1", "search_properties", json!({"location": "Tokyo"}));
        provider.queue_stream(vec![
            Ok(StreamChunk::ToolCalls(vec![call.clone()])),
            Ok(StreamChunk::Terminal),
        ]);
        provider.queue_text(&["Found one."]);

        collect(service.open_stream(&chat.id, "flats in Tokyo").await.unwrap()).await;
        collect(service.open_stream(&chat.id, "tell me more").await.unwrap()).await;

        let requests = provider.recorded_requests();
        let second = &requests[1].messages;
        let roles: Vec<LlmRole> = second.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![LlmRole::User, LlmRole::Assistant, LlmRole::Tool, LlmRole::User]
        );
        assert_eq!(second[1].tool_calls, vec![call]);
        assert_eq!(second[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_get_messages_and_list_chats() {
        let (service, _store, provider) = service();
        let first = service.create_chat().await.unwrap();
        let second = service.create_chat().await.unwrap();

        let chats = service.list_chats().await.unwrap();
        assert_eq!(chats[0].id, second.id);
        assert_eq!(chats[1].id, first.id);

        provider.queue_text(&["hello"]);
        collect(service.open_stream(&first.id, "hi").await.unwrap()).await;
        let messages = service.get_messages(&first.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].sequence_id < messages[1].sequence_id);

        assert!(matches!(
            service.get_messages("missing").await,
            Err(RelayError::ChatNotFound(_))
        ));
    }

    fn external(id: &str, content: Value, is_error: bool) -> ExternalToolResult {
        ExternalToolResult {
            tool_call_id: id.into(),
            name: "book_viewing".into(),
            content,
            is_error,
        }
    }

    /// Chat whose last assistant message issued calls nobody answered yet
    async fn chat_with_open_calls(store: &MockStore, ids: &[&str]) -> String {
        let chat = store.create_chat().await.unwrap();
        let calls = ids
            .iter()
            .map(|id| ToolCallRequest::new(*id, "book_viewing", json!({"listing": "tky-001"})))
            .collect();
        store
            .append_messages(
                &chat.id,
                &[
                    NewMessage::user("book a viewing"),
                    NewMessage::assistant("", calls),
                ],
            )
            .await
            .unwrap();
        chat.id
    }

    #[tokio::test]
    async fn test_submit_tool_results() {
        let (service, store, _provider) = service();
        let chat_id = chat_with_open_calls(&store, &["c1", "c2"]).await;

        let results = vec![
            external("c1", json!({"count": 0}), false),
            external("c2", json!("no slots"), true),
        ];
        let stored = service.submit_tool_results(&chat_id, &results).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].content.as_deref(), Some("{\"count\":0}"));
        assert_eq!(stored[1].content.as_deref(), Some("no slots"));
        assert!(matches!(
            &stored[1].tool_payload,
            Some(ToolPayload::Result { is_error: true, .. })
        ));
        assert_eq!(store.messages_for(&chat_id).len(), 4);

        assert!(matches!(
            service.submit_tool_results(&chat_id, &[]).await,
            Err(RelayError::InvalidInput(_))
        ));
        assert!(matches!(
            service.submit_tool_results("missing", &results).await,
            Err(RelayError::ChatNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_submit_rejects_results_for_calls_never_issued() {
        let (service, store, provider) = service();
        let chat_id = chat_with_open_calls(&store, &["c1"]).await;

        let err = service
            .submit_tool_results(&chat_id, &[external("zzz", json!("ok"), false)])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(ref m) if m.contains("zzz")));

        // One bad id rejects the whole batch
        let err = service
            .submit_tool_results(
                &chat_id,
                &[
                    external("c1", json!("ok"), false),
                    external("zzz", json!("ok"), false),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
        assert_eq!(store.messages_for(&chat_id).len(), 2);

        // The chat still produces a well-formed conversation
        provider.queue_text(&["Done."]);
        collect(service.open_stream(&chat_id, "next").await.unwrap()).await;
        let messages = &provider.recorded_requests()[0].messages;
        assert!(messages.iter().all(|m| m.role != LlmRole::Tool));
    }

    #[tokio::test]
    async fn test_submit_rejects_duplicate_and_already_answered_calls() {
        let (service, store, _provider) = service();
        let chat_id = chat_with_open_calls(&store, &["c1", "c2"]).await;

        let err = service
            .submit_tool_results(
                &chat_id,
                &[
                    external("c1", json!("a"), false),
                    external("c1", json!("b"), false),
                ],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(ref m) if m.contains("duplicate")));

        service
            .submit_tool_results(&chat_id, &[external("c1", json!("a"), false)])
            .await
            .unwrap();
        let err = service
            .submit_tool_results(&chat_id, &[external("c1", json!("again"), false)])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(ref m) if m.contains("already")));
        assert_eq!(store.messages_for(&chat_id).len(), 3);
    }

    #[tokio::test]
    async fn test_relay_resolved_calls_cannot_be_answered_again() {
        let (service, _store, provider) = service();
        let chat = service.create_chat().await.unwrap();
        let call = ToolCallRequest::new("c1", "teleport", json!({}));
        provider.queue_stream(vec![
            Ok(StreamChunk::ToolCalls(vec![call])),
            Ok(StreamChunk::Terminal),
        ]);
        collect(service.open_stream(&chat.id, "beam me up").await.unwrap()).await;

        let err = service
            .submit_tool_results(&chat.id, &[external("c1", json!("arrived"), false)])
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_client_disconnect_keeps_user_message_only() {
        let (service, store, provider) = service();
        let chat = service.create_chat().await.unwrap();
        provider.queue_hanging(vec![Ok(StreamChunk::Content("Sure".into()))]);

        let mut rx = service.open_stream(&chat.id, "hi").await.unwrap();
        assert_eq!(rx.recv().await, Some(ClientEvent::Content("Sure".into())));
        drop(rx);

        // The next turn sees no partial reply
        provider.queue_text(&["Hello again."]);
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        collect(service.open_stream(&chat.id, "still there?").await.unwrap()).await;

        let roles: Vec<LlmRole> = provider.recorded_requests()[1]
            .messages
            .iter()
            .map(|m| m.role)
            .collect();
        assert_eq!(roles, vec![LlmRole::User, LlmRole::User]);
        assert_eq!(store.messages_for(&chat.id).len(), 3);
    }
}
