use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// LLM provider configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_iterations")]
    pub max_iterations_default: u32,
    /// Model used for the end-of-turn summarizer call (§4.6 step 9). Falls
    /// back to the task's own `model_id` when unset — see DESIGN.md for the
    /// rationale.
    #[serde(default)]
    pub summarizer_model_id: Option<String>,
    /// Registered model endpoints, keyed by `model_id`.
    #[serde(default)]
    pub models: Vec<ModelConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            max_iterations_default: default_max_iterations(),
            summarizer_model_id: None,
            models: Vec::new(),
        }
    }
}

/// One remote model's connection details, in the Converse-style wire
/// contract of SPEC_FULL.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub model_id: String,
    pub base_url: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Environment variable holding the bearer credential. `None` means
    /// unauthenticated (only sensible for local dev endpoints).
    #[serde(default)]
    pub env: Option<String>,
}

fn default_timeout_ms() -> u64 {
    20_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_max_iterations() -> u32 {
    250
}
