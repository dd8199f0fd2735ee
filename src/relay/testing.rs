//! Mock implementations for testing
//!
//! These mocks enable relay tests without a database or network.

use super::traits::{CompletionProvider, TranscriptStore};
use crate::db::{Chat, DbError, DbResult, Message, NewMessage};
use crate::llm::{ChunkStream, LlmError, LlmRequest, StreamChunk};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// Mock Transcript Store
// ============================================================================

/// In-memory store with switchable read/write failures
#[derive(Default)]
pub struct MockStore {
    chats: Mutex<Vec<Chat>>,
    messages: Mutex<Vec<Message>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// All stored messages for a chat, bypassing failure injection
    pub fn messages_for(&self, chat_id: &str) -> Vec<Message> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect()
    }

    fn check_read(&self) -> DbResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn check_write(&self) -> DbResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DbError::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn require_chat(&self, chat_id: &str) -> DbResult<Chat> {
        self.chats
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.id == chat_id)
            .cloned()
            .ok_or_else(|| DbError::ChatNotFound(chat_id.to_string()))
    }
}

#[async_trait]
impl TranscriptStore for MockStore {
    async fn create_chat(&self) -> DbResult<Chat> {
        self.check_write()?;
        let mut chats = self.chats.lock().unwrap();
        // Strictly increasing timestamps keep newest-first ordering stable
        let offset = i64::try_from(chats.len()).unwrap_or(0);
        let chat = Chat {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now() + Duration::milliseconds(offset),
        };
        chats.push(chat.clone());
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> DbResult<Chat> {
        self.check_read()?;
        self.require_chat(chat_id)
    }

    async fn list_chats(&self) -> DbResult<Vec<Chat>> {
        self.check_read()?;
        let mut chats = self.chats.lock().unwrap().clone();
        chats.reverse();
        Ok(chats)
    }

    async fn list_messages(&self, chat_id: &str) -> DbResult<Vec<Message>> {
        self.check_read()?;
        Ok(self.messages_for(chat_id))
    }

    async fn list_recent_messages(&self, chat_id: &str, limit: usize) -> DbResult<Vec<Message>> {
        self.check_read()?;
        let all = self.messages_for(chat_id);
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    async fn append_message(&self, chat_id: &str, message: &NewMessage) -> DbResult<Message> {
        let mut stored = self
            .append_messages(chat_id, std::slice::from_ref(message))
            .await?;
        stored
            .pop()
            .ok_or_else(|| DbError::Unavailable("nothing appended".to_string()))
    }

    async fn append_messages(
        &self,
        chat_id: &str,
        messages: &[NewMessage],
    ) -> DbResult<Vec<Message>> {
        self.check_write()?;
        for message in messages {
            message.validate().map_err(DbError::InvalidMessage)?;
        }
        self.require_chat(chat_id)?;

        let mut all = self.messages.lock().unwrap();
        let mut sequence_id = all
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .map(|m| m.sequence_id)
            .max()
            .unwrap_or(0);

        let mut stored = Vec::with_capacity(messages.len());
        for message in messages {
            sequence_id += 1;
            let record = Message {
                message_id: uuid::Uuid::new_v4().to_string(),
                chat_id: chat_id.to_string(),
                sequence_id,
                role: message.role,
                content: message.content.clone(),
                tool_payload: message.tool_payload.clone(),
                created_at: Utc::now(),
            };
            all.push(record.clone());
            stored.push(record);
        }
        Ok(stored)
    }
}

// ============================================================================
// Mock Completion Provider
// ============================================================================

enum Script {
    Chunks(Vec<Result<StreamChunk, LlmError>>),
    /// Yields the chunks, then never ends
    Hanging(Vec<Result<StreamChunk, LlmError>>),
    OpenError(LlmError),
}

/// Provider that replays queued scripts, one per request
#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<LlmRequest>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a finite stream
    pub fn queue_stream(&self, chunks: Vec<Result<StreamChunk, LlmError>>) {
        self.scripts.lock().unwrap().push_back(Script::Chunks(chunks));
    }

    /// Queue content fragments followed by a terminal chunk
    pub fn queue_text(&self, fragments: &[&str]) {
        let mut chunks: Vec<_> = fragments
            .iter()
            .map(|f| Ok(StreamChunk::Content((*f).to_string())))
            .collect();
        chunks.push(Ok(StreamChunk::Terminal));
        self.queue_stream(chunks);
    }

    /// Queue a stream that stalls after the given chunks
    pub fn queue_hanging(&self, chunks: Vec<Result<StreamChunk, LlmError>>) {
        self.scripts.lock().unwrap().push_back(Script::Hanging(chunks));
    }

    /// Queue a failure to open the stream
    pub fn queue_open_error(&self, error: LlmError) {
        self.scripts
            .lock()
            .unwrap()
            .push_back(Script::OpenError(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for MockProvider {
    async fn stream_completion(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| LlmError::network("No mock stream queued"))?;

        match script {
            Script::Chunks(chunks) => Ok(futures::stream::iter(chunks).boxed()),
            Script::Hanging(chunks) => Ok(futures::stream::iter(chunks)
                .chain(futures::stream::pending())
                .boxed()),
            Script::OpenError(error) => Err(error),
        }
    }
}
