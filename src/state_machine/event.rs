//! Events fed into the relay state machine

use crate::llm::StreamChunk;

#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    /// Next chunk from the provider
    Chunk(StreamChunk),

    /// Provider raised an error or ended without a terminal chunk
    ProviderFailed { message: String },

    /// The client stopped listening
    ClientDisconnected,

    /// Assistant turn and tool results were written
    Persisted,

    /// Writing the turn failed
    PersistFailed { message: String },
}
