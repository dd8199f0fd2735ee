//! Relay service errors

use crate::db::DbError;
use crate::llm::LlmError;
use thiserror::Error;

/// Failures surfaced before an event stream is opened
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Store unavailable: {0}")]
    StoreUnavailable(DbError),
    #[error("Chat not found: {0}")]
    ChatNotFound(String),
    #[error("Provider error: {0}")]
    Provider(#[from] LlmError),
    #[error("Invalid request: {0}")]
    InvalidInput(String),
}

impl From<DbError> for RelayError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::ChatNotFound(id) => RelayError::ChatNotFound(id),
            DbError::InvalidMessage(reason) => RelayError::InvalidInput(reason),
            other => RelayError::StoreUnavailable(other),
        }
    }
}
