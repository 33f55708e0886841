use std::sync::{Arc, PoisonError, RwLock};

use super::{parse_endpoints, Endpoint};
use crate::error::{Error, Result};

/// Ordered endpoint list shared by every proxy of a pool.
///
/// Readers take a snapshot of the whole list; `configure` swaps in a freshly
/// parsed list so a concurrent `resolve` never sees a half-built one.
#[derive(Debug)]
pub struct EndpointResolver {
    endpoints: RwLock<Arc<[Endpoint]>>,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self {
            endpoints: RwLock::new(Arc::from(Vec::new())),
        }
    }
}

impl EndpointResolver {
    /// Create an empty resolver. `resolve` fails until `configure` succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a resolver from a spec string.
    pub fn from_spec(spec: &str) -> Result<Self> {
        let resolver = Self::new();
        resolver.configure(spec)?;
        Ok(resolver)
    }

    /// Replace the endpoint list with the one parsed from `spec`.
    pub fn configure(&self, spec: &str) -> Result<()> {
        if spec.trim().is_empty() {
            return Err(Error::Configuration("endpoint spec is empty".to_string()));
        }
        let parsed = parse_endpoints(spec);
        if parsed.is_empty() {
            return Err(Error::Configuration(format!(
                "endpoint spec has no usable host:port entries: {spec:?}"
            )));
        }
        tracing::debug!(servers = parsed.len(), "endpoint list configured");
        let parsed: Arc<[Endpoint]> = parsed.into();
        *self.endpoints.write().unwrap_or_else(PoisonError::into_inner) = parsed;
        Ok(())
    }

    /// Map a selector to an endpoint: `endpoints[|selector| mod len]`.
    pub fn resolve(&self, selector: i64) -> Result<Endpoint> {
        let endpoints = self.snapshot();
        if endpoints.is_empty() {
            return Err(Error::NoEndpoints);
        }
        let idx = (selector.unsigned_abs() % endpoints.len() as u64) as usize;
        Ok(endpoints[idx].clone())
    }

    pub fn num_servers(&self) -> usize {
        self.snapshot().len()
    }

    /// Current endpoint list.
    pub fn snapshot(&self) -> Arc<[Endpoint]> {
        Arc::clone(&self.endpoints.read().unwrap_or_else(PoisonError::into_inner))
    }
}
