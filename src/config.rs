//! Proxy engine configuration
//!
//! Serde-backed settings for the codec registry and the pipeline stages,
//! loadable from a JSON file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProxyError, ProxyResult};
use crate::proto::attribute::CredentialMode;

/// Address-masking configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingConfig {
    /// 48-bit mask: high 32 bits for the address, low 16 for the port
    pub mask: u64,
}

impl Default for MaskingConfig {
    fn default() -> Self {
        // Identity mask; operators set a real value per deployment
        Self { mask: 0 }
    }
}

/// Bounds for the transaction-username cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameCacheConfig {
    /// Maximum number of pending transactions held
    pub capacity: usize,
    /// Seconds an unanswered transaction stays correlatable
    pub ttl_secs: u64,
}

impl UsernameCacheConfig {
    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

impl Default for UsernameCacheConfig {
    fn default() -> Self {
        Self {
            capacity: 4096,
            ttl_secs: 30,
        }
    }
}

/// Complete proxy engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProxyConfig {
    /// Credential mode the attribute registry operates under
    pub credential_mode: CredentialMode,
    /// Address-masking settings
    pub masking: MaskingConfig,
    /// Transaction-username cache bounds
    pub username_cache: UsernameCacheConfig,
}

impl ProxyConfig {
    /// Load configuration from a JSON file
    pub fn load(path: impl AsRef<Path>) -> ProxyResult<Self> {
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| ProxyError::Configuration(format!("invalid config JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Persist configuration to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> ProxyResult<()> {
        let raw = serde_json::to_string_pretty(self)
            .map_err(|e| ProxyError::Configuration(format!("serialize config: {}", e)))?;
        fs::write(path, raw)?;
        Ok(())
    }

    /// Validate field ranges
    pub fn validate(&self) -> ProxyResult<()> {
        if self.masking.mask >> 48 != 0 {
            return Err(ProxyError::Configuration(format!(
                "masking.mask 0x{:X} exceeds 48 bits",
                self.masking.mask
            )));
        }
        if self.username_cache.capacity == 0 {
            return Err(ProxyError::Configuration(
                "username_cache.capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
