use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store adapter configuration (C1)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// On-disk root where per-document JSON files are persisted.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Capacity of each pub/sub channel's broadcast buffer. Subscribers
    /// that lag behind this many events miss the oldest ones (best-effort
    /// pub/sub, per SPEC_FULL.md §4.1).
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("./data/store")
}

fn default_channel_capacity() -> usize {
    256
}
