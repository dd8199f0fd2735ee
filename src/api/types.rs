//! API request and response types

use crate::relay::ExternalToolResult;
use serde::{Deserialize, Serialize};

/// Query for opening a chat stream
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(rename = "chatId")]
    pub chat_id: String,
    pub message: String,
}

/// Request to store externally-resolved tool results
#[derive(Debug, Deserialize)]
pub struct ToolResultsRequest {
    pub results: Vec<ExternalToolResult>,
}

/// Response for the health check
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
