//! CLI for rpcpool.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use rpcpool_core::config::{self, RpcPoolConfig};
use rpcpool_core::Strategy;
use std::path::PathBuf;

use commands::{run_call, run_config, run_endpoints, CallOverrides};

/// Top-level CLI for rpcpool.
#[derive(Debug, Parser)]
#[command(name = "rpcpool")]
#[command(about = "rpcpool: pooled RPC clients with failover and bounded retry", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/rpcpool/config.toml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Parse an endpoint list and print how selectors map onto it.
    Endpoints {
        /// Endpoint spec, e.g. "host1:9090,host2:9090".
        spec: String,
    },

    /// Run one line-protocol call through a client pool.
    Call {
        /// Operation name sent to the server.
        op: String,

        /// Operation arguments.
        args: Vec<String>,

        /// Endpoint spec overriding `servers` from the config file.
        #[arg(long, value_name = "SPEC")]
        servers: Option<String>,

        /// Endpoint selection on retry: round-robin, random, failover or random-failover.
        #[arg(long, value_name = "STRATEGY")]
        strategy: Option<Strategy>,

        /// Attempt budget per call, including the first.
        #[arg(long, value_name = "N")]
        retries: Option<u32>,

        /// Delay between attempts in milliseconds.
        #[arg(long, value_name = "MS")]
        backoff_ms: Option<u64>,
    },

    /// Show the config file location and the effective configuration.
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<RpcPoolConfig> {
    let cfg = match path {
        Some(p) => config::load_from(p)?,
        None => config::load_or_init()?,
    };
    tracing::debug!("loaded config: {:?}", cfg);
    Ok(cfg)
}

impl CliCommand {
    pub fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        match cli.command {
            CliCommand::Endpoints { spec } => run_endpoints(&spec)?,
            CliCommand::Call {
                op,
                args,
                servers,
                strategy,
                retries,
                backoff_ms,
            } => {
                let cfg = load_config(cli.config.as_ref())?;
                let overrides = CallOverrides {
                    servers,
                    strategy,
                    retries,
                    backoff_ms,
                };
                run_call(&overrides.apply(cfg), &op, &args)?;
            }
            CliCommand::Config => {
                let cfg = load_config(cli.config.as_ref())?;
                let path = match cli.config {
                    Some(p) => p,
                    None => config::config_path()?,
                };
                run_config(&path, &cfg)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
