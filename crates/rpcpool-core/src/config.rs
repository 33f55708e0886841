use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{RetrySettings, Strategy};

/// Pool sizing, blocking and validation parameters (`[pool]` in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of objects (borrowed + idle) the pool holds.
    pub max_active: usize,
    /// Maximum number of idle objects kept on return; extras are destroyed.
    pub max_idle: usize,
    /// Idle objects the eviction sweep keeps (and tops up to).
    pub min_idle: usize,
    /// How long `borrow` blocks when the pool is exhausted.
    pub max_wait_ms: u64,
    /// Validate idle objects before handing them out.
    pub test_on_borrow: bool,
    /// Validate freshly created objects.
    pub test_on_create: bool,
    /// Validate idle objects during the eviction sweep.
    pub test_while_idle: bool,
    /// Period of the eviction sweep; 0 disables it.
    pub eviction_interval_ms: u64,
    /// Idle time after which an object becomes evictable.
    pub min_evictable_idle_ms: u64,
}

impl PoolConfig {
    pub const DEFAULT_MAX_ACTIVE: usize = 8;
    pub const DEFAULT_MAX_IDLE: usize = 8;
    pub const DEFAULT_MIN_IDLE: usize = 0;
    pub const DEFAULT_MAX_WAIT_MS: u64 = 3_000;

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_millis(self.eviction_interval_ms)
    }

    pub fn min_evictable_idle(&self) -> Duration {
        Duration::from_millis(self.min_evictable_idle_ms)
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_active: Self::DEFAULT_MAX_ACTIVE,
            max_idle: Self::DEFAULT_MAX_IDLE,
            min_idle: Self::DEFAULT_MIN_IDLE,
            max_wait_ms: Self::DEFAULT_MAX_WAIT_MS,
            test_on_borrow: false,
            test_on_create: false,
            test_while_idle: false,
            eviction_interval_ms: 10_000,
            min_evictable_idle_ms: 30 * 60 * 1000,
        }
    }
}

/// Retry policy parameters (optional `[retry]` section in config.toml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Attempts per call, including the first.
    pub max_retries: u32,
    /// Fixed delay in milliseconds between attempts.
    pub backoff_ms: u64,
    pub strategy: Strategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let d = RetrySettings::DEFAULT;
        Self {
            max_retries: d.max_retries,
            backoff_ms: d.backoff.as_millis() as u64,
            strategy: d.strategy,
        }
    }
}

impl From<&RetryConfig> for RetrySettings {
    fn from(c: &RetryConfig) -> Self {
        RetrySettings::new(c.max_retries, Duration::from_millis(c.backoff_ms), c.strategy)
    }
}

/// Client configuration loaded from `~/.config/rpcpool/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcPoolConfig {
    /// Endpoint list, e.g. `"10.0.0.1:9090,10.0.0.2:9090"`.
    pub servers: String,
    /// TCP connect timeout for the line client.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Read/write timeout for the line client.
    #[serde(default = "default_io_timeout_ms")]
    pub io_timeout_ms: u64,
    /// Optional pool settings; if missing, built-in defaults are used.
    #[serde(default)]
    pub pool: Option<PoolConfig>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

fn default_connect_timeout_ms() -> u64 {
    2_000
}

fn default_io_timeout_ms() -> u64 {
    5_000
}

impl Default for RpcPoolConfig {
    fn default() -> Self {
        Self {
            servers: "127.0.0.1:9090".to_string(),
            connect_timeout_ms: default_connect_timeout_ms(),
            io_timeout_ms: default_io_timeout_ms(),
            pool: None,
            retry: None,
        }
    }
}

impl RpcPoolConfig {
    pub fn pool_config(&self) -> PoolConfig {
        self.pool.clone().unwrap_or_default()
    }

    pub fn retry_settings(&self) -> RetrySettings {
        self.retry
            .as_ref()
            .map(RetrySettings::from)
            .unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("rpcpool")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RpcPoolConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RpcPoolConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit file.
pub fn load_from(path: &Path) -> Result<RpcPoolConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: RpcPoolConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RpcPoolConfig::default();
        let pool = cfg.pool_config();
        assert_eq!(pool.max_active, 8);
        assert_eq!(pool.max_wait(), Duration::from_secs(3));
        assert!(!pool.test_on_borrow && !pool.test_on_create && !pool.test_while_idle);
        assert_eq!(pool.eviction_interval(), Duration::from_secs(10));
        assert_eq!(cfg.retry_settings(), RetrySettings::DEFAULT);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = RpcPoolConfig {
            pool: Some(PoolConfig::default()),
            retry: Some(RetryConfig::default()),
            ..RpcPoolConfig::default()
        };
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RpcPoolConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            servers = "a:1, b:2"

            [pool]
            max_active = 2
            max_wait_ms = 250
            test_on_borrow = true

            [retry]
            max_retries = 5
            backoff_ms = 100
            strategy = "random_failover"
        "#;
        let cfg: RpcPoolConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.servers, "a:1, b:2");
        assert_eq!(cfg.connect_timeout_ms, 2_000);
        let pool = cfg.pool_config();
        assert_eq!(pool.max_active, 2);
        assert_eq!(pool.max_idle, PoolConfig::DEFAULT_MAX_IDLE);
        assert_eq!(pool.max_wait(), Duration::from_millis(250));
        assert!(pool.test_on_borrow);
        let retry = cfg.retry_settings();
        assert_eq!(retry.max_retries, 5);
        assert_eq!(retry.backoff, Duration::from_millis(100));
        assert_eq!(retry.strategy, Strategy::RandomFailover);
    }

    #[test]
    fn config_toml_missing_sections_use_defaults() {
        let cfg: RpcPoolConfig = toml::from_str(r#"servers = "x:1""#).unwrap();
        assert!(cfg.pool.is_none());
        assert!(cfg.retry.is_none());
        assert_eq!(cfg.pool_config(), PoolConfig::default());
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let toml = r#"
            servers = "x:1"
            [retry]
            strategy = "sticky"
        "#;
        assert!(toml::from_str::<RpcPoolConfig>(toml).is_err());
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "servers = \"h:7\"\n[retry]\nstrategy = \"failover\"\n").unwrap();
        let cfg = load_from(&path).unwrap();
        assert_eq!(cfg.servers, "h:7");
        assert_eq!(cfg.retry_settings().strategy, Strategy::Failover);
        assert!(load_from(&dir.path().join("missing.toml")).is_err());
    }
}
