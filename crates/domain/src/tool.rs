use serde::{Deserialize, Serialize};

/// A tool definition as advertised to the LLM's `tool_spec`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the tool's input.
    pub input_schema: serde_json::Value,
}

/// The result of invoking a tool, before it is enqueued as a `tool_result`
/// envelope by C9 (SPEC_FULL.md §4.9).
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Success(serde_json::Value),
    Error(String),
}

impl ToolOutcome {
    /// Render the outcome into the JSON text carried by the resulting
    /// `tool_result` content block, and whether it is an error.
    pub fn into_result_text(self) -> (String, bool) {
        match self {
            ToolOutcome::Success(value) => (value.to_string(), false),
            ToolOutcome::Error(message) => {
                let payload = serde_json::json!({ "error": message });
                (payload.to_string(), true)
            }
        }
    }
}
