//! Engine configuration.
//!
//! Stored in TOML so installations can tune cache lifetime, upload chunking,
//! and the server-quirk table without rebuilding. Every field has a default;
//! a missing file loads as the default configuration.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Seconds a cached metadata entity stays valid.
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Upload chunk size in bytes.
    #[serde(default = "default_upload_chunk_size")]
    pub upload_chunk_size: u64,

    /// Retries per upload chunk before the upload operation fails.
    #[serde(default = "default_upload_chunk_retries")]
    pub upload_chunk_retries: u32,

    /// API error codes normalized to success. These encode server behavior
    /// quirks ("already subscribed", "rating unchanged"), not engine logic,
    /// so the table lives here rather than in the state machine.
    #[serde(default = "default_noop_api_codes")]
    pub noop_api_codes: Vec<u32>,
}

fn default_cache_ttl_secs() -> u64 {
    900
}

fn default_upload_chunk_size() -> u64 {
    8 * 1024 * 1024
}

fn default_upload_chunk_retries() -> u32 {
    3
}

fn default_noop_api_codes() -> Vec<u32> {
    // 15004: already subscribed, 15043: rating already matches
    vec![15004, 15043]
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            cache_ttl_secs: default_cache_ttl_secs(),
            upload_chunk_size: default_upload_chunk_size(),
            upload_chunk_retries: default_upload_chunk_retries(),
            noop_api_codes: default_noop_api_codes(),
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file, falling back to defaults when absent.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, content)?;
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn is_noop_code(&self, code: u32) -> bool {
        self.noop_api_codes.contains(&code)
    }
}
