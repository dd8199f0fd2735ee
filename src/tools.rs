//! Local capabilities the model can invoke
//!
//! Capabilities are stateless: everything they need arrives as arguments.

mod property_search;

pub use property_search::PropertySearchTool;

use crate::llm::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Failure raised by a capability
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
    #[error("{0}")]
    Failed(String),
}

/// A function the model may call by name
#[async_trait]
pub trait Capability: Send + Sync {
    /// Function name
    fn name(&self) -> &str;

    /// Description for the model
    fn description(&self) -> String;

    /// JSON schema for the arguments
    fn input_schema(&self) -> Value;

    /// Execute with structured arguments
    async fn run(&self, arguments: Value) -> Result<Value, CapabilityError>;
}

/// Registry of available capabilities, keyed by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Capability>>,
}

impl ToolRegistry {
    /// Registry with no capabilities
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the real-estate assistant's capabilities
    pub fn standard() -> Self {
        Self::empty().with_tool(Arc::new(PropertySearchTool))
    }

    /// Add a capability, replacing any existing one with the same name
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Capability>) -> Self {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
        self
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    /// Tool schemas advertised to the provider
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description(),
                input_schema: t.input_schema(),
            })
            .collect()
    }
}
