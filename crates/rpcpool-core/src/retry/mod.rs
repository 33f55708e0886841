//! Retry policy for the reconnecting client.
//!
//! This module holds fault classification (which transport faults a
//! reconnect can fix) and the per-proxy retry state: attempt counting,
//! fixed backoff and the endpoint selection strategy.

mod classify;
mod policy;

pub use classify::{classify, FaultClass};
pub use policy::{RetryDecision, RetryPolicy, RetrySettings, Strategy};
