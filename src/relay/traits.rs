//! Trait abstractions for relay I/O
//!
//! These traits enable testing the relay with mock implementations.

use crate::db::{Chat, Database, DbResult, Message, NewMessage};
use crate::llm::{ChunkStream, LlmError, LlmRequest, LlmService};
use async_trait::async_trait;
use std::sync::Arc;

/// Durable, append-only chat transcript
#[async_trait]
pub trait TranscriptStore: Send + Sync {
    async fn create_chat(&self) -> DbResult<Chat>;

    async fn get_chat(&self, chat_id: &str) -> DbResult<Chat>;

    /// Newest first
    async fn list_chats(&self) -> DbResult<Vec<Chat>>;

    /// Oldest first
    async fn list_messages(&self, chat_id: &str) -> DbResult<Vec<Message>>;

    /// The most recent `limit` messages, oldest first
    async fn list_recent_messages(&self, chat_id: &str, limit: usize) -> DbResult<Vec<Message>>;

    async fn append_message(&self, chat_id: &str, message: &NewMessage) -> DbResult<Message>;

    /// Append all messages or none
    async fn append_messages(
        &self,
        chat_id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>>;
}

/// Source of streamed completions
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn stream_completion(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: TranscriptStore + ?Sized> TranscriptStore for Arc<T> {
    async fn create_chat(&self) -> DbResult<Chat> {
        (**self).create_chat().await
    }

    async fn get_chat(&self, chat_id: &str) -> DbResult<Chat> {
        (**self).get_chat(chat_id).await
    }

    async fn list_chats(&self) -> DbResult<Vec<Chat>> {
        (**self).list_chats().await
    }

    async fn list_messages(&self, chat_id: &str) -> DbResult<Vec<Message>> {
        (**self).list_messages(chat_id).await
    }

    async fn list_recent_messages(&self, chat_id: &str, limit: usize) -> DbResult<Vec<Message>> {
        (**self).list_recent_messages(chat_id, limit).await
    }

    async fn append_message(&self, chat_id: &str, message: &NewMessage) -> DbResult<Message> {
        (**self).append_message(chat_id, message).await
    }

    async fn append_messages(
        &self,
        chat_id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>> {
        (**self).append_messages(chat_id, messages).await
    }
}

#[async_trait]
impl<T: CompletionProvider + ?Sized> CompletionProvider for Arc<T> {
    async fn stream_completion(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        (**self).stream_completion(request).await
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use Database as a `TranscriptStore`
#[derive(Clone)]
pub struct DatabaseStore {
    db: Database,
}

impl DatabaseStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TranscriptStore for DatabaseStore {
    async fn create_chat(&self) -> DbResult<Chat> {
        self.db.create_chat()
    }

    async fn get_chat(&self, chat_id: &str) -> DbResult<Chat> {
        self.db.get_chat(chat_id)
    }

    async fn list_chats(&self) -> DbResult<Vec<Chat>> {
        self.db.list_chats()
    }

    async fn list_messages(&self, chat_id: &str) -> DbResult<Vec<Message>> {
        self.db.list_messages(chat_id)
    }

    async fn list_recent_messages(&self, chat_id: &str, limit: usize) -> DbResult<Vec<Message>> {
        self.db.list_recent_messages(chat_id, limit)
    }

    async fn append_message(&self, chat_id: &str, message: &NewMessage) -> DbResult<Message> {
        self.db.append_message(chat_id, message)
    }

    async fn append_messages(
        &self,
        chat_id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>> {
        self.db.append_messages(chat_id, messages)
    }
}

/// Adapter to use an `LlmService` as a `CompletionProvider`
#[derive(Clone)]
pub struct ServiceProvider {
    service: Arc<dyn LlmService>,
}

impl ServiceProvider {
    pub fn new(service: Arc<dyn LlmService>) -> Self {
        Self { service }
    }

    pub fn model_id(&self) -> &str {
        self.service.model_id()
    }
}

#[async_trait]
impl CompletionProvider for ServiceProvider {
    async fn stream_completion(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        self.service.stream(request).await
    }
}
