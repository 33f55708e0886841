//! Generic blocking object pool.
//!
//! Objects are created and destroyed through a [`PooledObjectFactory`].
//! Borrowers block up to `max_wait` when `max_active` objects are out; idle
//! objects are reused last-in first-out and a background sweep evicts
//! objects that stayed idle too long while keeping `min_idle` around.

mod pool;

pub use pool::ObjectPool;

use crate::error::Result;

/// Lifecycle hooks the pool calls for its objects.
pub trait PooledObjectFactory: Send + Sync + 'static {
    type Object: Send + 'static;

    /// Build a new object for the pool.
    fn create(&self) -> Result<Self::Object>;

    /// Release an object's resources. Must not fail.
    fn destroy(&self, obj: Self::Object);

    /// Liveness check used by `test_on_borrow`, `test_on_create` and
    /// `test_while_idle`.
    fn validate(&self, _obj: &mut Self::Object) -> bool {
        true
    }
}
