pub mod config;
pub mod logging;

pub mod client;
pub mod endpoint;
pub mod error;
pub mod interrupt;
pub mod line;
pub mod object_pool;
pub mod pool;
pub mod proxy;
pub mod retry;

#[cfg(test)]
mod mock;

pub use client::{ClientFactory, Connector, RpcClient, Transport};
pub use config::{PoolConfig, RetryConfig, RpcPoolConfig};
pub use endpoint::{Endpoint, EndpointResolver};
pub use error::{Error, Result, RpcError, TransportError, TransportErrorKind};
pub use interrupt::Interrupt;
pub use pool::ClientPool;
pub use proxy::ResilientClient;
pub use retry::{RetryPolicy, RetrySettings, Strategy};
