//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bytes per page; must cover the largest tuple of any schema involved.
    pub page_size: usize,

    /// Pages of resident memory per operator. Sorts and block-nested joins
    /// need at least 3.
    pub num_buff: usize,

    /// Directory for spill files.
    pub spill_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_size: 4096,
            num_buff: 8,
            spill_dir: "/tmp/riffle-spill".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `RIFFLE_PAGE_SIZE`: bytes per page
    /// - `RIFFLE_NUM_BUFF`: pages per operator
    /// - `RIFFLE_SPILL_DIR`: spill directory
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("RIFFLE_PAGE_SIZE") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.page_size = v;
            }
        }

        if let Ok(s) = std::env::var("RIFFLE_NUM_BUFF") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.num_buff = v;
            }
        }

        if let Ok(s) = std::env::var("RIFFLE_SPILL_DIR") {
            cfg.spill_dir = s;
        }

        cfg
    }
}
