//! `OpenAI`-compatible streaming chat completions

use super::stream::decode_chunk_stream;
use super::types::{ChunkStream, LlmMessage, LlmRequest, LlmRole};
use super::{LlmError, LlmService};
use crate::config::LlmConfig;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest silence tolerated between body reads while a completion streams
const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Streaming client for any `/chat/completions` endpoint speaking the `OpenAI` protocol
pub struct OpenAIService {
    client: Client,
    api_key: Option<String>,
    endpoint: String,
    model: String,
}

impl OpenAIService {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        Self::with_idle_timeout(config, STREAM_IDLE_TIMEOUT)
    }

    /// No whole-request deadline: a long completion may stream for as long as
    /// it keeps producing bytes.
    fn with_idle_timeout(config: &LlmConfig, idle: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .read_timeout(idle)
            .build()
            .map_err(|e| LlmError::unknown(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    fn translate_request(&self, request: &LlmRequest) -> OpenAIRequest {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);

        if !request.system.is_empty() {
            messages.push(OpenAIMessage {
                role: "system",
                content: Some(request.system.clone()),
                tool_calls: None,
                tool_call_id: None,
            });
        }
        messages.extend(request.messages.iter().map(Self::translate_message));

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(
                request
                    .tools
                    .iter()
                    .map(|t| OpenAITool {
                        r#type: "function",
                        function: OpenAIFunction {
                            name: t.name.clone(),
                            description: t.description.clone(),
                            parameters: t.input_schema.clone(),
                        },
                    })
                    .collect(),
            )
        };

        OpenAIRequest {
            model: self.model.clone(),
            messages,
            tools,
            max_tokens: request.max_tokens,
            stream: true,
        }
    }

    fn translate_message(msg: &LlmMessage) -> OpenAIMessage {
        let role = match msg.role {
            LlmRole::User => "user",
            LlmRole::Assistant => "assistant",
            LlmRole::Tool => "tool",
        };

        let tool_calls = if msg.tool_calls.is_empty() {
            None
        } else {
            Some(
                msg.tool_calls
                    .iter()
                    .map(|call| OpenAIToolCall {
                        id: call.id.clone(),
                        r#type: "function",
                        function: OpenAIFunctionCall {
                            name: call.name.clone(),
                            arguments: match &call.arguments {
                                serde_json::Value::String(raw) => raw.clone(),
                                other => other.to_string(),
                            },
                        },
                    })
                    .collect(),
            )
        };

        // Assistant turns that only issued calls may omit content
        let content = match (&msg.content, &tool_calls) {
            (Some(text), Some(_)) if text.is_empty() => None,
            (content, _) => content.clone(),
        };

        OpenAIMessage {
            role,
            content,
            tool_calls,
            tool_call_id: msg.tool_call_id.clone(),
        }
    }
}

#[async_trait]
impl LlmService for OpenAIService {
    async fn stream(&self, request: &LlmRequest) -> Result<ChunkStream, LlmError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| LlmError::auth("OPENAI_API_KEY is not configured"))?;

        let body = self.translate_request(request);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::network(format!("Request timeout: {e}"))
                } else if e.is_connect() {
                    LlmError::network(format!("Connection failed: {e}"))
                } else {
                    LlmError::unknown(format!("Request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<OpenAIErrorResponse>(&body)
                .map_or(body, |e| e.error.message);
            return Err(LlmError::from_status(status.as_u16(), &message));
        }

        let bytes = response
            .bytes_stream()
            .map(|item| {
                item.map(|b| b.to_vec())
                    .map_err(|e| LlmError::network(format!("Stream read failed: {e}")))
            })
            .boxed();

        Ok(decode_chunk_stream(bytes))
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<OpenAITool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<OpenAIToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OpenAITool {
    r#type: &'static str,
    function: OpenAIFunction,
}

#[derive(Debug, Serialize)]
struct OpenAIFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct OpenAIToolCall {
    id: String,
    r#type: &'static str,
    function: OpenAIFunctionCall,
}

#[derive(Debug, Serialize)]
struct OpenAIFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIErrorResponse {
    error: OpenAIError,
}

#[derive(Debug, Deserialize)]
struct OpenAIError {
    message: String,
}
