use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Main server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ServerConfig {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub fallback: FallbackConfig,
    #[serde(default)]
    pub ttl: TtlConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Maximum number of cached entries
    pub capacity: usize,
    /// Estimated-footprint ceiling before pressure eviction
    pub memory_ceiling_bytes: usize,
    /// Background expiry sweep interval
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            memory_ceiling_bytes: 50 * 1024 * 1024,
            sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,
    /// How long the breaker stays open before admitting a probe
    pub cooldown_ms: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Per-owner entry count that triggers trimming
    pub owner_cap: usize,
    /// Entries retained (newest first) when trimming
    pub trim_to: usize,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            owner_cap: 100,
            trim_to: 50,
        }
    }
}

/// Per-operation cache TTLs: shorter for volatile data (unread counts),
/// longer for semi-static data (resolved identities)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TtlConfig {
    pub list_secs: u64,
    pub count_secs: u64,
    pub identity_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            list_secs: 120,
            count_secs: 30,
            identity_secs: 600,
        }
    }
}

impl TtlConfig {
    pub fn list(&self) -> Duration {
        Duration::from_secs(self.list_secs)
    }

    pub fn count(&self) -> Duration {
        Duration::from_secs(self.count_secs)
    }

    pub fn identity(&self) -> Duration {
        Duration::from_secs(self.identity_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ServerConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }
}
