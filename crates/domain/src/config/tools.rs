use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool dispatch configuration (C9)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ToolsConfig {
    /// Hard timeout applied around a single tool invocation, milliseconds.
    /// `0` disables the timeout (tool-internal policy only).
    #[serde(default = "default_invoke_timeout_ms")]
    pub invoke_timeout_ms: u64,
}

fn default_invoke_timeout_ms() -> u64 {
    60_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_sixty_seconds() {
        let cfg = ToolsConfig::default();
        assert_eq!(cfg.invoke_timeout_ms, 60_000);
    }
}
