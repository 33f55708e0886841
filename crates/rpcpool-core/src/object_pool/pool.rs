use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use super::PooledObjectFactory;
use crate::config::PoolConfig;
use crate::error::{Error, Result};

struct Idle<T> {
    obj: T,
    since: Instant,
}

struct State<T> {
    /// Oldest first; borrowers take from the back.
    idle: Vec<Idle<T>>,
    /// Objects handed out, being created, or under idle validation.
    active: usize,
    closed: bool,
}

struct Shared<M: PooledObjectFactory> {
    factory: M,
    config: PoolConfig,
    state: Mutex<State<M::Object>>,
    /// Signalled when an object or a slot frees up.
    available: Condvar,
    /// Signalled on close so the evictor exits promptly.
    evictor_wake: Condvar,
}

impl<M: PooledObjectFactory> Shared<M> {
    fn lock(&self) -> MutexGuard<'_, State<M::Object>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn max_active(&self) -> usize {
        self.config.max_active.max(1)
    }

    /// Give back a slot held by a destroyed or failed object.
    fn release_slot(&self) {
        let mut state = self.lock();
        state.active = state.active.saturating_sub(1);
        drop(state);
        self.available.notify_one();
    }

    fn discard(&self, obj: M::Object) {
        self.factory.destroy(obj);
        self.release_slot();
    }

    fn create_validated(&self) -> Result<M::Object> {
        let mut obj = self.factory.create()?;
        if self.config.test_on_create && !self.factory.validate(&mut obj) {
            self.factory.destroy(obj);
            return Err(Error::Validation("new object failed validation".to_string()));
        }
        Ok(obj)
    }

    /// Evict stale idle objects (keeping `min_idle`) and, with
    /// `test_while_idle`, destroy idle objects that fail validation.
    fn evict(&self) {
        let min_evictable = self.config.min_evictable_idle();
        let (stale, under_test) = {
            let mut state = self.lock();
            if state.closed {
                return;
            }
            let mut stale = Vec::new();
            while state.idle.len() > self.config.min_idle {
                match state.idle.first() {
                    Some(oldest) if oldest.since.elapsed() >= min_evictable => {
                        stale.push(state.idle.remove(0).obj);
                    }
                    _ => break,
                }
            }
            let under_test = if self.config.test_while_idle {
                let taken = std::mem::take(&mut state.idle);
                state.active += taken.len();
                taken
            } else {
                Vec::new()
            };
            (stale, under_test)
        };

        if !stale.is_empty() {
            tracing::debug!(evicted = stale.len(), "evicting idle objects");
        }
        for obj in stale {
            self.factory.destroy(obj);
        }
        if !under_test.is_empty() {
            self.revalidate(under_test);
        }
        self.available.notify_all();
    }

    fn revalidate(&self, under_test: Vec<Idle<M::Object>>) {
        let mut keep = Vec::with_capacity(under_test.len());
        let mut failed = 0usize;
        for mut idle in under_test {
            if self.factory.validate(&mut idle.obj) {
                keep.push(idle);
            } else {
                failed += 1;
                self.factory.destroy(idle.obj);
            }
        }
        if failed > 0 {
            tracing::debug!(failed, "idle objects failed validation");
        }
        let mut state = self.lock();
        state.active = state.active.saturating_sub(keep.len() + failed);
        if state.closed {
            drop(state);
            for idle in keep {
                self.factory.destroy(idle.obj);
            }
            return;
        }
        // Borrowers may have pushed newer objects meanwhile; keep oldest first.
        keep.append(&mut state.idle);
        state.idle = keep;
    }

    /// Create idle objects until `min_idle` is met or the pool is full.
    fn ensure_min_idle(&self) {
        loop {
            {
                let mut state = self.lock();
                if state.closed
                    || state.idle.len() >= self.config.min_idle
                    || state.active + state.idle.len() >= self.max_active()
                {
                    return;
                }
                state.active += 1;
            }
            let obj = match self.create_validated() {
                Ok(obj) => obj,
                Err(e) => {
                    tracing::debug!(error = %e, "could not top up idle objects");
                    self.release_slot();
                    return;
                }
            };
            let mut state = self.lock();
            state.active = state.active.saturating_sub(1);
            if state.closed {
                drop(state);
                self.factory.destroy(obj);
                return;
            }
            state.idle.push(Idle {
                obj,
                since: Instant::now(),
            });
            drop(state);
            self.available.notify_one();
        }
    }
}

fn run_evictor<M: PooledObjectFactory>(shared: Arc<Shared<M>>) {
    let interval = shared.config.eviction_interval();
    loop {
        let deadline = Instant::now() + interval;
        let mut state = shared.lock();
        loop {
            if state.closed {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            state = shared
                .evictor_wake
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        drop(state);
        shared.evict();
        shared.ensure_min_idle();
    }
}

/// Bounded pool of objects built by a [`PooledObjectFactory`].
pub struct ObjectPool<M: PooledObjectFactory> {
    shared: Arc<Shared<M>>,
    evictor: Mutex<Option<JoinHandle<()>>>,
}

impl<M: PooledObjectFactory> ObjectPool<M> {
    /// Create the pool and start the eviction sweep if its interval is non-zero.
    pub fn new(factory: M, config: PoolConfig) -> Self {
        let shared = Arc::new(Shared {
            factory,
            config,
            state: Mutex::new(State {
                idle: Vec::new(),
                active: 0,
                closed: false,
            }),
            available: Condvar::new(),
            evictor_wake: Condvar::new(),
        });
        let evictor = if shared.config.eviction_interval_ms > 0 {
            let shared = Arc::clone(&shared);
            Some(thread::spawn(move || run_evictor(shared)))
        } else {
            None
        };
        Self {
            shared,
            evictor: Mutex::new(evictor),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.shared.config
    }

    pub fn factory(&self) -> &M {
        &self.shared.factory
    }

    /// Objects currently borrowed (or being created/validated).
    pub fn num_active(&self) -> usize {
        self.shared.lock().active
    }

    pub fn num_idle(&self) -> usize {
        self.shared.lock().idle.len()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    /// Take an idle object or create one, blocking up to `max_wait` while
    /// the pool is at `max_active`.
    pub fn borrow(&self) -> Result<M::Object> {
        let shared = &self.shared;
        let max_wait = shared.config.max_wait();
        let deadline = Instant::now() + max_wait;
        let mut state = shared.lock();
        loop {
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(idle) = state.idle.pop() {
                state.active += 1;
                drop(state);
                let mut obj = idle.obj;
                if !shared.config.test_on_borrow || shared.factory.validate(&mut obj) {
                    return Ok(obj);
                }
                tracing::debug!("idle object failed validation on borrow");
                shared.discard(obj);
                state = shared.lock();
                continue;
            }
            if state.active + state.idle.len() < shared.max_active() {
                state.active += 1;
                drop(state);
                return shared.create_validated().map_err(|e| {
                    shared.release_slot();
                    e
                });
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(Error::PoolExhausted { waited: max_wait });
            }
            state = shared
                .available
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Give a borrowed object back. Kept idle unless the pool is closed or
    /// already holds `max_idle` idle objects, in which case it is destroyed.
    pub fn return_object(&self, obj: M::Object) {
        let shared = &self.shared;
        let mut state = shared.lock();
        state.active = state.active.saturating_sub(1);
        if state.closed || state.idle.len() >= shared.config.max_idle {
            drop(state);
            shared.available.notify_one();
            shared.factory.destroy(obj);
            return;
        }
        state.idle.push(Idle {
            obj,
            since: Instant::now(),
        });
        drop(state);
        shared.available.notify_one();
    }

    /// Destroy a borrowed object instead of returning it.
    pub fn invalidate(&self, obj: M::Object) {
        self.shared.discard(obj);
    }

    /// Run one eviction sweep now.
    pub fn evict(&self) {
        self.shared.evict();
        self.shared.ensure_min_idle();
    }

    /// Close the pool: destroy idle objects, fail pending and future borrows,
    /// and destroy borrowed objects as they come back. Idempotent.
    pub fn close(&self) {
        let idle = {
            let mut state = self.shared.lock();
            if state.closed {
                Vec::new()
            } else {
                state.closed = true;
                std::mem::take(&mut state.idle)
            }
        };
        self.shared.available.notify_all();
        self.shared.evictor_wake.notify_all();
        for idle in idle {
            self.shared.factory.destroy(idle.obj);
        }
        let handle = self
            .evictor
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::warn!("pool evictor thread panicked");
            }
        }
    }
}

impl<M: PooledObjectFactory> Drop for ObjectPool<M> {
    fn drop(&mut self) {
        self.close();
    }
}
