//! `rpcpool config` – print the config path and effective settings.

use anyhow::Result;
use rpcpool_core::config::{RetryConfig, RpcPoolConfig};
use std::path::Path;

pub fn run_config(path: &Path, cfg: &RpcPoolConfig) -> Result<()> {
    // Fill in the optional sections so every effective value is shown.
    let settings = cfg.retry_settings();
    let effective = RpcPoolConfig {
        pool: Some(cfg.pool_config()),
        retry: Some(RetryConfig {
            max_retries: settings.max_retries,
            backoff_ms: settings.backoff.as_millis() as u64,
            strategy: settings.strategy,
        }),
        ..cfg.clone()
    };
    println!("# {}", path.display());
    print!("{}", toml::to_string_pretty(&effective)?);
    Ok(())
}
