//! Function-calling tools
//!
//! Tools are exposed to the LLM through OpenAI-style function schemas and
//! executed by the registry when the model requests them mid-turn.

pub mod registry;
pub mod time;

pub use registry::{Tool, ToolRegistry, ToolSchema};
pub use time::{CurrentDateTool, CurrentTimeTool};

use thiserror::Error;

/// Tool errors surface back to the model as tool-message content, never to
/// the end user directly.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("execution failed: {0}")]
    Execution(String),
}

impl From<ToolError> for confab_core::Error {
    fn from(err: ToolError) -> Self {
        let name = match &err {
            ToolError::NotFound(name) => name.clone(),
            _ => String::new(),
        };
        confab_core::Error::Tool {
            name,
            reason: err.to_string(),
        }
    }
}

/// Registry with the built-in tool set.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(CurrentTimeTool);
    registry.register(CurrentDateTool);
    registry
}
