//! LLM provider abstraction
//!
//! Streaming completions from an `OpenAI`-compatible endpoint.

mod error;
mod openai;
mod stream;
mod types;

pub use error::{LlmError, LlmErrorKind};
pub use openai::OpenAIService;
pub use types::*;

use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Instant;

/// Common interface for LLM providers
#[async_trait]
pub trait LlmService: Send + Sync {
    /// Open a streaming completion
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError>;

    /// Get the model ID
    fn model_id(&self) -> &str;
}

/// Logging wrapper for LLM services
pub struct LoggingService {
    inner: Arc<dyn LlmService>,
    model_id: String,
}

impl LoggingService {
    pub fn new(inner: Arc<dyn LlmService>) -> Self {
        let model_id = inner.model_id().to_string();
        Self { inner, model_id }
    }
}

#[async_trait]
impl LlmService for LoggingService {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let start = Instant::now();
        let result = self.inner.stream(request).await;

        let stream = match result {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(
                    model = %self.model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    retryable = e.kind.is_retryable(),
                    "LLM stream failed to open"
                );
                return Err(e);
            }
        };

        tracing::debug!(
            model = %self.model_id,
            messages = request.messages.len(),
            first_byte_ms = %start.elapsed().as_millis(),
            "LLM stream opened"
        );

        let model_id = self.model_id.clone();
        let mut content_chunks = 0u64;
        let mut tool_calls = 0usize;
        Ok(stream
            .inspect(move |item| match item {
                Ok(StreamChunk::Content(_)) => content_chunks += 1,
                Ok(StreamChunk::ToolCalls(calls)) => tool_calls += calls.len(),
                Ok(StreamChunk::Terminal) => tracing::info!(
                    model = %model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    content_chunks,
                    tool_calls,
                    "LLM stream completed"
                ),
                Err(e) => tracing::error!(
                    model = %model_id,
                    duration_ms = %start.elapsed().as_millis(),
                    error = %e.message,
                    content_chunks,
                    "LLM stream failed"
                ),
            })
            .boxed())
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
