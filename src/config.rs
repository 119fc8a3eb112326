//! Runtime configuration (§10.3): a small set of tunables for the shape
//! tree, deopt manager, and event loop, persisted as TOML under the user's
//! config directory.
//!
//! Generalized from the teacher's `conf.rs::AxConf`, which persists a much
//! larger `property=value` text file by hand-parsing lines; this keeps the
//! same load-defaults-then-override-from-file shape but serializes through
//! `toml`/`serde` instead, and locates the file via `dirs` the same way
//! `AxConf::config_path` does.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Parent-chain length above which `ShapeTree` prefers a flattened
    /// per-shape property table over walking parents one at a time.
    pub shape_flatten_threshold: usize,
    /// Number of `(function, point, reason)` hits recorded before
    /// `DeoptManager::hot_deopts` will report a site at all; sites below
    /// this count are still tracked but excluded from `hot_deopts`.
    pub hot_deopt_threshold: u64,
    /// Default `k` used by CLI/demo callers of `hot_deopts` when the user
    /// doesn't specify one.
    pub hot_deopt_top_k: usize,
    /// Safety cap on microtasks drained in one `EventLoop::run` pass before
    /// bailing out, guarding against a microtask that requeues itself
    /// forever and starves the macrotask queue.
    pub microtask_drain_limit: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            shape_flatten_threshold: 8,
            hot_deopt_threshold: 1,
            hot_deopt_top_k: 10,
            microtask_drain_limit: 100_000,
        }
    }
}

impl RuntimeConfig {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("corex").join("config.toml"))
    }

    /// Loads configuration from the default path, falling back to defaults
    /// for anything missing or if the file doesn't exist at all.
    pub fn load() -> Self {
        match Self::config_path().and_then(|p| std::fs::read_to_string(p).ok()) {
            Some(contents) => toml::from_str(&contents).unwrap_or_default(),
            None => RuntimeConfig::default(),
        }
    }

    pub fn save(&self) -> Result<(), String> {
        let path = Self::config_path().ok_or("cannot determine config directory")?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(|e| format!("cannot create config dir: {e}"))?;
        }
        let text = toml::to_string_pretty(self).map_err(|e| format!("cannot serialize config: {e}"))?;
        std::fs::write(&path, text).map_err(|e| format!("cannot write config: {e}"))?;
        Ok(())
    }
}
