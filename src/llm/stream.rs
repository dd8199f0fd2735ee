//! Decoding of `OpenAI`-style chat completion event streams
//!
//! Bytes arrive in arbitrary slices. `SseDecoder` reassembles them into
//! `data:` payloads, `DeltaAssembler` turns payloads into classified
//! `StreamChunk`s, merging tool-call argument fragments by index until the
//! choice finishes.

use super::types::{ChunkStream, StreamChunk, ToolCallRequest};
use super::LlmError;
use futures::stream::{BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

const DONE_SENTINEL: &str = "[DONE]";

/// Reassembles server-sent event lines from raw byte slices
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes, returning every complete `data:` payload
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(data) = data_payload(&line) {
                payloads.push(data);
            }
        }
        payloads
    }

    /// Flush a final line that was not newline-terminated
    pub fn finish(&mut self) -> Option<String> {
        let line = std::mem::take(&mut self.buffer);
        data_payload(&line)
    }
}

fn data_payload(line: &[u8]) -> Option<String> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim_end_matches(['\r', '\n']);
    line.strip_prefix("data:")
        .map(|data| data.trim_start().to_string())
        .filter(|data| !data.is_empty())
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

impl PartialToolCall {
    fn into_request(self) -> ToolCallRequest {
        let arguments = if self.arguments.trim().is_empty() {
            Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(&self.arguments).unwrap_or_else(|e| {
                tracing::warn!(
                    tool = %self.name,
                    error = %e,
                    "Tool call arguments are not valid JSON; passing raw text"
                );
                Value::String(self.arguments.clone())
            })
        };
        ToolCallRequest {
            id: self.id,
            name: self.name,
            arguments,
        }
    }
}

/// Classifies stream payloads into chunks
#[derive(Debug, Default)]
pub struct DeltaAssembler {
    pending: BTreeMap<u32, PartialToolCall>,
    finish_reason: Option<String>,
    done: bool,
}

impl DeltaAssembler {
    /// Whether the terminal chunk has been produced
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Interpret one `data:` payload
    pub fn accept(&mut self, data: &str) -> Result<Vec<StreamChunk>, LlmError> {
        if data == DONE_SENTINEL {
            return Ok(self.terminate());
        }

        let event: StreamEvent = serde_json::from_str(data)
            .map_err(|e| LlmError::stream(format!("Malformed stream event: {e}")))?;

        if let Some(error) = event.error {
            return Err(LlmError::server_error(format!(
                "Provider reported error mid-stream: {}",
                error.message
            )));
        }

        let mut chunks = Vec::new();
        let Some(choice) = event.choices.into_iter().next() else {
            // Usage-only or keep-alive events carry no choices
            return Ok(chunks);
        };

        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
            chunks.push(StreamChunk::Content(content));
        }

        for fragment in choice.delta.tool_calls.unwrap_or_default() {
            let entry = self.pending.entry(fragment.index).or_default();
            if let Some(id) = fragment.id {
                entry.id = id;
            }
            if let Some(function) = fragment.function {
                if let Some(name) = function.name {
                    entry.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    entry.arguments.push_str(&arguments);
                }
            }
        }

        if let Some(reason) = choice.finish_reason {
            self.finish_reason = Some(reason);
            chunks.extend(self.flush_tool_calls());
        }

        Ok(chunks)
    }

    /// The byte stream ended. Completes only if the provider already said it finished.
    pub fn finish(&mut self) -> Result<Vec<StreamChunk>, LlmError> {
        if self.done {
            return Ok(Vec::new());
        }
        if self.finish_reason.is_some() {
            return Ok(self.terminate());
        }
        Err(LlmError::stream("Stream ended before a terminal event"))
    }

    fn terminate(&mut self) -> Vec<StreamChunk> {
        let mut chunks: Vec<StreamChunk> = self.flush_tool_calls().into_iter().collect();
        chunks.push(StreamChunk::Terminal);
        self.done = true;
        chunks
    }

    fn flush_tool_calls(&mut self) -> Option<StreamChunk> {
        if self.pending.is_empty() {
            return None;
        }
        let calls = std::mem::take(&mut self.pending)
            .into_values()
            .filter(|call| !call.name.is_empty())
            .map(PartialToolCall::into_request)
            .collect::<Vec<_>>();
        if calls.is_empty() {
            None
        } else {
            Some(StreamChunk::ToolCalls(calls))
        }
    }
}

struct DecodeState {
    bytes: BoxStream<'static, Result<Vec<u8>, LlmError>>,
    sse: SseDecoder,
    assembler: DeltaAssembler,
    queue: VecDeque<Result<StreamChunk, LlmError>>,
    exhausted: bool,
}

impl DecodeState {
    fn enqueue(&mut self, result: Result<Vec<StreamChunk>, LlmError>) {
        match result {
            Ok(chunks) => {
                self.queue.extend(chunks.into_iter().map(Ok));
                if self.assembler.is_done() {
                    self.exhausted = true;
                }
            }
            Err(e) => {
                self.queue.push_back(Err(e));
                self.exhausted = true;
            }
        }
    }

    fn feed(&mut self, bytes: &[u8]) {
        for data in self.sse.push(bytes) {
            if self.exhausted {
                break;
            }
            let result = self.assembler.accept(&data);
            self.enqueue(result);
        }
    }

    fn close(&mut self) {
        if let Some(data) = self.sse.finish() {
            if !self.exhausted {
                let result = self.assembler.accept(&data);
                self.enqueue(result);
            }
        }
        if !self.exhausted {
            let result = self.assembler.finish();
            self.enqueue(result);
        }
        self.exhausted = true;
    }
}

/// Turn a raw byte stream into a chunk stream.
///
/// The returned stream stops after the first `Terminal` or error; nothing is
/// read from the byte stream past that point.
pub fn decode_chunk_stream(bytes: BoxStream<'static, Result<Vec<u8>, LlmError>>) -> ChunkStream {
    let state = DecodeState {
        bytes,
        sse: SseDecoder::default(),
        assembler: DeltaAssembler::default(),
        queue: VecDeque::new(),
        exhausted: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.queue.pop_front() {
                return Some((item, state));
            }
            if state.exhausted {
                return None;
            }
            match state.bytes.next().await {
                Some(Ok(bytes)) => state.feed(&bytes),
                Some(Err(e)) => state.enqueue(Err(e)),
                None => state.close(),
            }
        }
    })
    .boxed()
}

// Wire types

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallFragment>>,
}

#[derive(Debug, Deserialize)]
struct ToolCallFragment {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<FunctionFragment>,
}

#[derive(Debug, Deserialize)]
struct FunctionFragment {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}
