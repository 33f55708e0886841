//! Reconnecting client proxy.
//!
//! [`ResilientClient`] owns one live client at a time. Every call goes
//! through [`ResilientClient::invoke`], which retries restartable transport
//! faults by closing the current transport, resolving a (possibly different)
//! endpoint from the retry policy's selector and opening a fresh client
//! there. Anything else is returned to the caller on first occurrence.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::client::{close_quietly, ClientFactory, Connector, RpcClient, Transport};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result, RpcError, TransportError, TransportErrorKind};
use crate::interrupt::Interrupt;
use crate::retry::{RetryDecision, RetryPolicy};

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a proxy, independent of its current connection.
pub type ProxyId = u64;

pub struct ResilientClient<F: ClientFactory> {
    id: ProxyId,
    connector: Arc<Connector<F>>,
    policy: RetryPolicy,
    client: Option<F::Client>,
    endpoint: Option<Endpoint>,
    generation: u64,
}

impl<F: ClientFactory> ResilientClient<F> {
    /// Create an unconnected proxy. The first call (or [`connect`](Self::connect))
    /// opens a client.
    pub fn new(connector: Arc<Connector<F>>, policy: RetryPolicy) -> Self {
        Self {
            id: NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed),
            connector,
            policy,
            client: None,
            endpoint: None,
            generation: 0,
        }
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    /// Generation of the pool that created this proxy; 0 outside a pool.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn set_generation(&mut self, generation: u64) {
        self.generation = generation;
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Handle another thread can use to abort this proxy's backoff sleeps.
    pub fn interrupt_handle(&self) -> Interrupt {
        self.policy.interrupt_handle()
    }

    /// Endpoint of the current (or last attempted) connection.
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// True when a client exists and its transport reports open.
    pub fn is_connected(&self) -> bool {
        self.client
            .as_ref()
            .map(|c| c.transport().is_open())
            .unwrap_or(false)
    }

    /// Replace the current client with a fresh one bound to the endpoint
    /// `selector` resolves to.
    pub fn connect(&mut self, selector: i64) -> Result<()> {
        let endpoint = self.connector.resolver().resolve(selector)?;
        self.reconnect(endpoint)?;
        Ok(())
    }

    /// Liveness check used by pool validation: connects to the first
    /// endpoint if there is no client yet, then reports transport state.
    pub fn validate(&mut self) -> bool {
        if self.client.is_none() {
            if let Err(e) = self.connect(0) {
                tracing::debug!(proxy = self.id, error = %e, "validation connect failed");
                return false;
            }
        }
        self.is_connected()
    }

    /// Run `op` against the underlying client, reconnecting and retrying on
    /// restartable transport faults per the retry policy.
    ///
    /// The first attempt reuses a live client if there is one; every retry
    /// closes it and connects to the endpoint picked by the policy. Only
    /// reconnects consume a selector.
    pub fn invoke<R, Op>(&mut self, operation: &str, mut op: Op) -> Result<R>
    where
        Op: FnMut(&mut F::Client) -> Result<R, RpcError>,
    {
        self.policy.reset();
        while !self.policy.exceeds_max_retries() {
            let renew = self.policy.attempt_count() > 0 || !self.is_connected();
            let endpoint = if renew {
                let selector = self.policy.advance();
                Some(self.connector.resolver().resolve(selector)?)
            } else {
                None
            };

            let err = match self.attempt(endpoint, &mut op) {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            match self.policy.decide(&err) {
                RetryDecision::NoRetry => return Err(err.into()),
                RetryDecision::GiveUp => {
                    let attempts = self.policy.attempt_count() + 1;
                    tracing::warn!(
                        proxy = self.id,
                        operation,
                        attempts,
                        error = %err,
                        "giving up after restartable faults"
                    );
                    return Err(match err {
                        RpcError::Transport(last) => Error::ExhaustedRetries {
                            attempts,
                            last: Some(last),
                        },
                        other => other.into(),
                    });
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::info!(
                        proxy = self.id,
                        operation,
                        error = %err,
                        "retrying [{}/{}] in {:?}",
                        self.policy.attempt_count() + 1,
                        self.policy.max_retries(),
                        delay
                    );
                    self.policy.sleep()?;
                }
            }
        }
        Err(Error::ExhaustedRetries {
            attempts: self.policy.attempt_count(),
            last: None,
        })
    }

    /// One attempt: optionally reconnect to `endpoint`, then dispatch.
    fn attempt<R, Op>(&mut self, endpoint: Option<Endpoint>, op: &mut Op) -> Result<R, RpcError>
    where
        Op: FnMut(&mut F::Client) -> Result<R, RpcError>,
    {
        if let Some(endpoint) = endpoint {
            self.reconnect(endpoint)?;
        }
        match self.client.as_mut() {
            Some(client) => op(client),
            None => Err(TransportError::new(TransportErrorKind::NotOpen, "no client").into()),
        }
    }

    fn reconnect(&mut self, endpoint: Endpoint) -> Result<(), TransportError> {
        self.disconnect();
        let opened = self.connector.open(&endpoint);
        self.endpoint = Some(endpoint);
        self.client = Some(opened?);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(mut client) = self.client.take() {
            close_quietly(&mut client);
        }
    }

    /// Close the current transport and drop the client. Idempotent.
    pub fn destroy(&mut self) {
        self.disconnect();
    }
}

impl<F: ClientFactory> Drop for ResilientClient<F> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<F: ClientFactory> PartialEq for ResilientClient<F> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<F: ClientFactory> Eq for ResilientClient<F> {}

impl<F: ClientFactory> Hash for ResilientClient<F> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl<F: ClientFactory> fmt::Debug for ResilientClient<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("connected", &self.is_connected())
            .field("policy", &self.policy)
            .finish()
    }
}
