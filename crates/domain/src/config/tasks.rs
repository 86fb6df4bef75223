use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Task lifecycle / concurrency configuration
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Task lifecycle and iteration-loop settings (C6/C7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Maximum number of tasks that may run concurrently on a worker host.
    /// Clamped to `1..=20`.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Default `max_iterations` for newly-created tasks when the caller
    /// does not supply one.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,
    /// Hard cap on tool-call round trips within a single iteration, as a
    /// last-resort guard against a model that never stops calling tools.
    #[serde(default = "default_max_tool_loops")]
    pub max_tool_loops: u32,
    /// Grace period before a SIGTERM'd task is force-killed, in milliseconds.
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            default_max_iterations: default_max_iterations(),
            max_tool_loops: default_max_tool_loops(),
            stop_grace_ms: default_stop_grace_ms(),
        }
    }
}

impl TaskConfig {
    /// Clamp `max_concurrent` to the allowed range `1..=20`.
    pub fn clamped(&self) -> Self {
        Self {
            max_concurrent: self.max_concurrent.clamp(1, 20),
            ..self.clone()
        }
    }
}

fn default_max_concurrent() -> usize {
    5
}

fn default_max_iterations() -> u32 {
    250
}

fn default_max_tool_loops() -> u32 {
    25
}

fn default_stop_grace_ms() -> u64 {
    5_000
}
