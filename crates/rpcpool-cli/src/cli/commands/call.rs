//! `rpcpool call` – run one call through a client pool.

use anyhow::{Context, Result};
use rpcpool_core::config::RpcPoolConfig;
use rpcpool_core::line::LineClientFactory;
use rpcpool_core::{ClientPool, Strategy};
use std::time::Duration;

/// Command-line flags that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct CallOverrides {
    pub servers: Option<String>,
    pub strategy: Option<Strategy>,
    pub retries: Option<u32>,
    pub backoff_ms: Option<u64>,
}

impl CallOverrides {
    pub fn apply(self, mut cfg: RpcPoolConfig) -> RpcPoolConfig {
        if let Some(servers) = self.servers {
            cfg.servers = servers;
        }
        if self.strategy.is_some() || self.retries.is_some() || self.backoff_ms.is_some() {
            let mut retry = cfg.retry.take().unwrap_or_default();
            if let Some(strategy) = self.strategy {
                retry.strategy = strategy;
            }
            if let Some(retries) = self.retries {
                retry.max_retries = retries;
            }
            if let Some(backoff_ms) = self.backoff_ms {
                retry.backoff_ms = backoff_ms;
            }
            cfg.retry = Some(retry);
        }
        cfg
    }
}

pub fn run_call(cfg: &RpcPoolConfig, op: &str, args: &[String]) -> Result<()> {
    let factory = LineClientFactory::new(
        Duration::from_millis(cfg.connect_timeout_ms),
        Duration::from_millis(cfg.io_timeout_ms),
    );
    let pool = ClientPool::new()
        .with_factory(factory)
        .with_servers(&cfg.servers)
        .with_context(|| format!("invalid servers {:?}", cfg.servers))?
        .with_pool_config(cfg.pool_config())
        .with_retry_settings(cfg.retry_settings());
    pool.init()?;

    let result = pool.call(op, |client| client.call(op, args));
    pool.destroy();
    let reply = result.with_context(|| format!("call {op} failed"))?;
    println!("{reply}");
    Ok(())
}
