//! Streaming relay between the client, the completion provider and the
//! transcript store

mod assembler;
mod dispatcher;
mod error;
mod executor;
mod service;
mod traits;

#[cfg(test)]
pub mod testing;

pub use assembler::ConversationAssembler;
pub use dispatcher::{ToolCallResult, ToolDispatcher};
pub use error::RelayError;
pub use executor::StreamRelay;
pub use service::{ChatService, ExternalToolResult, ProductionChatService};
pub use traits::{CompletionProvider, DatabaseStore, ServiceProvider, TranscriptStore};
