// ─────────────────────────────────────────────────────────────────────
// Probabilistic QA Kernel — Configuration
// ─────────────────────────────────────────────────────────────────────

use serde::{Deserialize, Serialize};

use crate::error::{PqaError, PqaResult};

/// What the update kernel does with a cache block once it is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushPolicy {
    /// Leave finished blocks resident in cache.
    Retain,
    /// Write finished blocks back and evict them, so they do not crowd
    /// out the working set of neighbouring workers.
    #[default]
    WriteBack,
}

/// Runtime configuration for the engine and its worker pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PqaConfig {
    /// Number of worker threads. 0 picks the available parallelism.
    pub worker_count: usize,

    /// Number of 4-lane vectors that fit the fast cache level.
    /// Mantissas and exponents share it, so a block holds half as many.
    /// Values below 2 disable cache blocking.
    /// Default: 8192 (256 KiB of 32-byte vectors).
    pub cache_block_vects: usize,

    /// Write-back policy for finished cache blocks.
    pub flush_policy: FlushPolicy,

    /// Worker threads are named `<prefix>-<index>`.
    pub thread_name_prefix: String,
}

impl Default for PqaConfig {
    fn default() -> Self {
        Self {
            worker_count: 0,
            cache_block_vects: 8192,
            flush_policy: FlushPolicy::default(),
            thread_name_prefix: "pqa-worker".to_string(),
        }
    }
}

impl PqaConfig {
    /// Validate configuration parameters.
    pub fn validate(&self) -> PqaResult<()> {
        if self.cache_block_vects >= 2 && self.cache_block_vects % 2 != 0 {
            return Err(PqaError::Config(format!(
                "cache_block_vects must be even when blocking is enabled, got {}",
                self.cache_block_vects
            )));
        }
        if self.thread_name_prefix.trim().is_empty() {
            return Err(PqaError::Config(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Worker count with the 0 = "all available cores" rule applied.
    pub fn resolved_worker_count(&self) -> usize {
        if self.worker_count > 0 {
            return self.worker_count;
        }
        match std::thread::available_parallelism() {
            Ok(n) => n.get(),
            Err(e) => {
                log::warn!("available_parallelism unavailable ({e}), using 1 worker");
                1
            }
        }
    }

    /// Whether the update kernel processes its range in cache blocks.
    pub fn cache_blocking(&self) -> bool {
        self.cache_block_vects >= 2
    }

    /// Load from JSON string.
    pub fn from_json(json: &str) -> PqaResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| PqaError::Config(format!("JSON parse error: {e}")))
    }
}
