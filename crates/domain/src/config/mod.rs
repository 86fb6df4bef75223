mod llm;
mod observability;
mod store;
mod tasks;
mod throttle;
mod tools;

pub use llm::*;
pub use observability::*;
pub use store::*;
pub use tasks::*;
pub use throttle::*;
pub use tools::*;

use serde::{Deserialize, Serialize};

/// Top-level configuration for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OrchestratorConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub throttle: ThrottleConfig,
    #[serde(default)]
    pub tasks: TaskConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl OrchestratorConfig {
    /// Load configuration from a TOML file, falling back to defaults for any
    /// field the file omits.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| crate::error::Error::Config(e.to_string()))
    }
}
