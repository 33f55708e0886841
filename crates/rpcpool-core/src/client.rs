//! Interfaces of the underlying RPC client and its transport.
//!
//! The pool never looks inside a client: it only needs to build one for an
//! endpoint, open and close its transport, and hand it to the caller's
//! operation closure.

use std::sync::Arc;

use crate::endpoint::{Endpoint, EndpointResolver};
use crate::error::TransportError;

/// Connection underneath a client. `open` and `close` should be idempotent.
pub trait Transport: Send {
    fn open(&mut self) -> Result<(), TransportError>;
    fn close(&mut self) -> Result<(), TransportError>;
    fn is_open(&self) -> bool;
}

/// A generated client stub bound to one transport.
pub trait RpcClient: Send {
    type Transport: Transport;

    fn transport(&self) -> &Self::Transport;
    fn transport_mut(&mut self) -> &mut Self::Transport;
}

/// Builds clients for a given endpoint.
pub trait ClientFactory: Send + Sync + 'static {
    type Client: RpcClient;

    /// Build a client whose transport targets `endpoint`. The transport may
    /// be returned unopened; [`Connector::open`] opens it.
    fn create(&self, endpoint: &Endpoint) -> Result<Self::Client, TransportError>;
}

/// Couples the endpoint list with a client factory: turns a selector into
/// an opened client.
#[derive(Debug)]
pub struct Connector<F> {
    resolver: Arc<EndpointResolver>,
    factory: Arc<F>,
}

impl<F: ClientFactory> Connector<F> {
    pub fn new(resolver: Arc<EndpointResolver>, factory: Arc<F>) -> Self {
        Self { resolver, factory }
    }

    pub fn resolver(&self) -> &Arc<EndpointResolver> {
        &self.resolver
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// Build a client for `endpoint` and make sure its transport is open.
    pub fn open(&self, endpoint: &Endpoint) -> Result<F::Client, TransportError> {
        let mut client = self.factory.create(endpoint)?;
        if !client.transport().is_open() {
            if let Err(e) = client.transport_mut().open() {
                close_quietly(&mut client);
                return Err(e);
            }
        }
        tracing::debug!(%endpoint, "connected");
        Ok(client)
    }
}

/// Close a client's transport, logging and discarding any error.
pub fn close_quietly<C: RpcClient>(client: &mut C) {
    if let Err(e) = client.transport_mut().close() {
        tracing::debug!(error = %e, "ignoring error while closing transport");
    }
}
