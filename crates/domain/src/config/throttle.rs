use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Throttle coordinator tunables (C3)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Tunables for the per-model multiplicative backoff described in
/// SPEC_FULL.md §4.3. The curve itself (`base_delay`) is implemented in
/// `sa-orchestrator::throttle`; these are just its knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThrottleConfig {
    #[serde(default = "default_floor")]
    pub floor_multiplier: f64,
    #[serde(default = "default_ceiling")]
    pub ceiling_multiplier: f64,
    /// Multiplier applied on a successful call (< 1.0 relaxes the rate).
    #[serde(default = "default_decay")]
    pub decay_factor: f64,
    /// Multiplier applied on a throttling rejection (> 1.0 backs off).
    #[serde(default = "default_growth")]
    pub growth_factor: f64,
    /// Floor on the base per-request delay, milliseconds, before the
    /// multiplier is applied.
    #[serde(default = "default_base_delay_floor_ms")]
    pub base_delay_floor_ms: u64,
    /// Output tokens per additional millisecond of base delay.
    #[serde(default = "default_tokens_per_ms")]
    pub output_tokens_per_ms: f64,
    /// Sleep window after a throttling rejection before the caller may
    /// retry, milliseconds.
    #[serde(default = "default_backoff_window_ms")]
    pub backoff_window_ms: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            floor_multiplier: default_floor(),
            ceiling_multiplier: default_ceiling(),
            decay_factor: default_decay(),
            growth_factor: default_growth(),
            base_delay_floor_ms: default_base_delay_floor_ms(),
            output_tokens_per_ms: default_tokens_per_ms(),
            backoff_window_ms: default_backoff_window_ms(),
        }
    }
}

fn default_floor() -> f64 {
    1.0
}
fn default_ceiling() -> f64 {
    3.0
}
fn default_decay() -> f64 {
    0.9
}
fn default_growth() -> f64 {
    1.5
}
fn default_base_delay_floor_ms() -> u64 {
    200
}
fn default_tokens_per_ms() -> f64 {
    0.1
}
fn default_backoff_window_ms() -> u64 {
    2_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_bounds() {
        let cfg = ThrottleConfig::default();
        assert_eq!(cfg.floor_multiplier, 1.0);
        assert_eq!(cfg.ceiling_multiplier, 3.0);
        assert_eq!(cfg.decay_factor, 0.9);
        assert_eq!(cfg.growth_factor, 1.5);
    }

    #[test]
    fn serde_roundtrip() {
        let cfg = ThrottleConfig { growth_factor: 1.8, ..ThrottleConfig::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: ThrottleConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.growth_factor, 1.8);
    }

    #[test]
    fn deserialize_empty_uses_defaults() {
        let cfg: ThrottleConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.backoff_window_ms, 2_000);
    }
}
