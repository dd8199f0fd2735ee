//! HTTP API
//!
//! Chat lifecycle routes plus the SSE stream that relays one completion.

mod handlers;
mod sse;
mod types;

pub use handlers::create_router;

use crate::relay::ProductionChatService;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chats: Arc<ProductionChatService>,
}

impl AppState {
    pub fn new(chats: ProductionChatService) -> Self {
        Self {
            chats: Arc::new(chats),
        }
    }
}
