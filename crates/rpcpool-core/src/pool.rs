//! Pool of resilient client proxies.
//!
//! [`ClientPool`] wires a [`ClientFactory`] and an [`EndpointResolver`] into
//! an [`ObjectPool`] of [`ResilientClient`]s. Each pooled proxy starts bound
//! to the first endpoint and carries its own copy of the retry settings.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::client::{ClientFactory, Connector};
use crate::config::PoolConfig;
use crate::endpoint::EndpointResolver;
use crate::error::{Error, Result, RpcError};
use crate::object_pool::{ObjectPool, PooledObjectFactory};
use crate::proxy::ResilientClient;
use crate::retry::RetrySettings;

/// Builds, validates and tears down pooled proxies.
pub struct ProxyFactory<F: ClientFactory> {
    connector: Arc<Connector<F>>,
    retry: RetrySettings,
    generation: u64,
}

impl<F: ClientFactory> ProxyFactory<F> {
    /// Proxies built by this factory are stamped with `generation`.
    pub fn new(connector: Arc<Connector<F>>, retry: RetrySettings, generation: u64) -> Self {
        Self {
            connector,
            retry,
            generation,
        }
    }

    pub fn retry_settings(&self) -> &RetrySettings {
        &self.retry
    }
}

impl<F: ClientFactory> PooledObjectFactory for ProxyFactory<F> {
    type Object = ResilientClient<F>;

    fn create(&self) -> Result<ResilientClient<F>> {
        let mut proxy = ResilientClient::new(Arc::clone(&self.connector), self.retry.policy());
        proxy.set_generation(self.generation);
        match proxy.connect(0) {
            Ok(()) => {}
            // The first invoke reconnects through the retry policy.
            Err(Error::Transport(e)) if e.is_restartable() => {
                tracing::debug!(proxy = proxy.id(), error = %e, "created proxy unconnected");
            }
            Err(e) => return Err(e),
        }
        tracing::debug!(proxy = proxy.id(), endpoint = ?proxy.endpoint(), "created pooled proxy");
        Ok(proxy)
    }

    fn destroy(&self, mut proxy: ResilientClient<F>) {
        tracing::debug!(proxy = proxy.id(), "destroying pooled proxy");
        proxy.destroy();
    }

    fn validate(&self, proxy: &mut ResilientClient<F>) -> bool {
        proxy.validate()
    }
}

/// The object pool built by one `init`, tagged with its generation.
struct Live<F: ClientFactory> {
    generation: u64,
    pool: Arc<ObjectPool<ProxyFactory<F>>>,
}

impl<F: ClientFactory> Clone for Live<F> {
    fn clone(&self) -> Self {
        Self {
            generation: self.generation,
            pool: Arc::clone(&self.pool),
        }
    }
}

/// Bounded pool of [`ResilientClient`]s.
///
/// Configure with the `with_*` builders, then [`init`](Self::init). After
/// [`destroy`](Self::destroy) the pool can be initialized again; proxies
/// borrowed before that are closed on return, never pooled again.
pub struct ClientPool<F: ClientFactory> {
    factory: Option<Arc<F>>,
    resolver: Option<Arc<EndpointResolver>>,
    pool_config: PoolConfig,
    retry: RetrySettings,
    inner: Mutex<Option<Live<F>>>,
    /// Last generation handed out; generations start at 1.
    generations: AtomicU64,
}

impl<F: ClientFactory> Default for ClientPool<F> {
    fn default() -> Self {
        Self {
            factory: None,
            resolver: None,
            pool_config: PoolConfig::default(),
            retry: RetrySettings::default(),
            inner: Mutex::new(None),
            generations: AtomicU64::new(0),
        }
    }
}

impl<F: ClientFactory> ClientPool<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_factory(mut self, factory: F) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<EndpointResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use a new resolver configured from an endpoint spec string.
    pub fn with_servers(self, spec: &str) -> Result<Self> {
        let resolver = EndpointResolver::from_spec(spec)?;
        Ok(self.with_resolver(Arc::new(resolver)))
    }

    pub fn with_pool_config(mut self, config: PoolConfig) -> Self {
        self.pool_config = config;
        self
    }

    /// Retry settings every pooled proxy copies at creation.
    pub fn with_retry_settings(mut self, retry: RetrySettings) -> Self {
        self.retry = retry;
        self
    }

    pub fn resolver(&self) -> Option<&Arc<EndpointResolver>> {
        self.resolver.as_ref()
    }

    pub fn pool_config(&self) -> &PoolConfig {
        &self.pool_config
    }

    pub fn retry_settings(&self) -> &RetrySettings {
        &self.retry
    }

    fn lock(&self) -> MutexGuard<'_, Option<Live<F>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Build the underlying pool. A no-op when already initialized.
    pub fn init(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.is_some() {
            return Ok(());
        }
        let resolver = self
            .resolver
            .as_ref()
            .ok_or_else(|| Error::Configuration("no endpoint resolver configured".to_string()))?;
        let factory = self
            .factory
            .as_ref()
            .ok_or_else(|| Error::Configuration("no client factory configured".to_string()))?;
        if resolver.num_servers() == 0 {
            return Err(Error::Configuration(
                "endpoint resolver has no servers".to_string(),
            ));
        }

        let connector = Arc::new(Connector::new(Arc::clone(resolver), Arc::clone(factory)));
        let generation = self.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let proxies = ProxyFactory::new(connector, self.retry, generation);
        *inner = Some(Live {
            generation,
            pool: Arc::new(ObjectPool::new(proxies, self.pool_config.clone())),
        });
        tracing::info!(
            generation,
            servers = resolver.num_servers(),
            max_active = self.pool_config.max_active,
            max_retries = self.retry.max_retries,
            strategy = ?self.retry.strategy,
            "client pool initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().is_some()
    }

    fn current(&self) -> Result<Live<F>> {
        self.lock().clone().ok_or(Error::NotInitialized)
    }

    /// The live pool, if `client` was borrowed from it.
    fn owner_of(&self, client: &ResilientClient<F>) -> Option<Arc<ObjectPool<ProxyFactory<F>>>> {
        match self.current() {
            Ok(live) if live.generation == client.generation() => Some(live.pool),
            _ => {
                tracing::debug!(
                    proxy = client.id(),
                    generation = client.generation(),
                    "closing proxy not owned by the live pool"
                );
                None
            }
        }
    }

    /// Take a proxy, blocking up to `max_wait` while `max_active` are out.
    pub fn borrow(&self) -> Result<ResilientClient<F>> {
        self.current()?.pool.borrow()
    }

    /// Hand a borrowed proxy back. A proxy borrowed before `destroy` (or not
    /// from this pool at all) is closed instead.
    pub fn return_client(&self, mut client: ResilientClient<F>) {
        match self.owner_of(&client) {
            Some(pool) => pool.return_object(client),
            None => client.destroy(),
        }
    }

    /// Drop a borrowed proxy without returning it, freeing its slot.
    pub fn invalidate(&self, mut client: ResilientClient<F>) {
        match self.owner_of(&client) {
            Some(pool) => pool.invalidate(client),
            None => client.destroy(),
        }
    }

    /// Borrow a proxy, run one resilient call on it and return it.
    pub fn call<R, Op>(&self, operation: &str, op: Op) -> Result<R>
    where
        Op: FnMut(&mut F::Client) -> Result<R, RpcError>,
    {
        let mut client = self.borrow()?;
        let out = client.invoke(operation, op);
        match &out {
            Err(Error::Interrupted) => self.invalidate(client),
            _ => self.return_client(client),
        }
        out
    }

    /// Proxies currently borrowed; 0 when uninitialized.
    pub fn num_active(&self) -> usize {
        self.current().map(|l| l.pool.num_active()).unwrap_or(0)
    }

    /// Proxies idle in the pool; 0 when uninitialized.
    pub fn num_idle(&self) -> usize {
        self.current().map(|l| l.pool.num_idle()).unwrap_or(0)
    }

    /// Close the pool and every idle proxy. Borrowed proxies are closed when
    /// returned. Idempotent; `init` may be called again afterwards.
    pub fn destroy(&self) {
        let live = self.lock().take();
        if let Some(live) = live {
            live.pool.close();
            tracing::info!(generation = live.generation, "client pool destroyed");
        }
    }
}

impl<F: ClientFactory> Drop for ClientPool<F> {
    fn drop(&mut self) {
        self.destroy();
    }
}
