use std::str::FromStr;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::classify::{classify, FaultClass};
use crate::error::{Error, Result, RpcError};
use crate::interrupt::Interrupt;

/// Upper bound (exclusive) for randomly drawn selectors.
const RANDOM_SELECTOR_BOUND: i64 = 255;

/// Process-wide generator for selector sampling, shared by every policy.
/// Only used to spread load across endpoints; not for anything secret.
static SELECTOR_RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();

fn random_selector(low: i64) -> i64 {
    let rng = SELECTOR_RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()));
    rng.lock()
        .unwrap_or_else(PoisonError::into_inner)
        .gen_range(low..RANDOM_SELECTOR_BOUND)
}

/// How a retry attempt picks its endpoint selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Random first endpoint, then walk the list by attempt number.
    #[default]
    RoundRobin,
    /// Random endpoint on every attempt.
    Random,
    /// Always start at the first endpoint, then walk the list.
    Failover,
    /// Start at the first endpoint, then pick randomly among the others.
    RandomFailover,
}

impl Strategy {
    /// Selector for the attempt following `attempt_count` earlier attempts.
    pub fn selector(self, attempt_count: u32) -> i64 {
        match self {
            Strategy::RoundRobin if attempt_count == 0 => random_selector(0),
            Strategy::RoundRobin | Strategy::Failover => i64::from(attempt_count),
            Strategy::Random => random_selector(0),
            Strategy::RandomFailover if attempt_count == 0 => 0,
            // Selector 0 is never drawn, but other selectors may still land on
            // index 0 through the modulo.
            Strategy::RandomFailover => random_selector(1),
        }
    }
}

impl FromStr for Strategy {
    type Err = Error;

    /// Accepts the config names (`round_robin`) and their kebab-case forms.
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(Strategy::RoundRobin),
            "random" => Ok(Strategy::Random),
            "failover" => Ok(Strategy::Failover),
            "random_failover" => Ok(Strategy::RandomFailover),
            _ => Err(Error::Configuration(format!("unknown retry strategy {s:?}"))),
        }
    }
}

/// Immutable retry configuration. Each proxy derives its own
/// [`RetryPolicy`] from one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrySettings {
    /// Attempt budget per call; 0 means no attempt is ever made.
    pub max_retries: u32,
    /// Fixed delay slept between attempts.
    pub backoff: Duration,
    pub strategy: Strategy,
}

impl RetrySettings {
    pub const DEFAULT: RetrySettings = RetrySettings {
        max_retries: 3,
        backoff: Duration::from_millis(1000),
        strategy: Strategy::RoundRobin,
    };

    pub fn new(max_retries: u32, backoff: Duration, strategy: Strategy) -> Self {
        Self {
            max_retries,
            backoff,
            strategy,
        }
    }

    /// Fresh per-proxy state for these settings.
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(*self)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Decision returned by the retry policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Fault is not retryable; propagate it unchanged.
    NoRetry,
    /// Fault is retryable but the attempt budget is spent.
    GiveUp,
    /// Sleep for the given delay, reconnect and try again.
    RetryAfter(Duration),
}

/// Mutable retry state for one proxy.
///
/// `reset` at the start of each call; `advance` picks the selector for the
/// current attempt; `sleep` backs off and counts the attempt as spent.
#[derive(Debug)]
pub struct RetryPolicy {
    settings: RetrySettings,
    attempt_count: u32,
    last_selector: i64,
    interrupt: Interrupt,
}

impl RetryPolicy {
    pub fn new(settings: RetrySettings) -> Self {
        Self {
            settings,
            attempt_count: 0,
            last_selector: 0,
            interrupt: Interrupt::new(),
        }
    }

    pub fn settings(&self) -> &RetrySettings {
        &self.settings
    }

    pub fn max_retries(&self) -> u32 {
        self.settings.max_retries
    }

    pub fn backoff(&self) -> Duration {
        self.settings.backoff
    }

    pub fn strategy(&self) -> Strategy {
        self.settings.strategy
    }

    /// Attempts already spent in the current call.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Selector of the last reconnect in the current call; 0 when the call
    /// has not reconnected, e.g. because it reused a live client.
    pub fn last_selector(&self) -> i64 {
        self.last_selector
    }

    /// Handle that can interrupt this policy's backoff sleeps.
    pub fn interrupt_handle(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn reset(&mut self) {
        self.attempt_count = 0;
        self.last_selector = 0;
    }

    pub fn exceeds_max_retries(&self) -> bool {
        self.attempt_count >= self.settings.max_retries
    }

    /// Pick and record the selector for the current attempt.
    pub fn advance(&mut self) -> i64 {
        self.last_selector = self.settings.strategy.selector(self.attempt_count);
        self.last_selector
    }

    /// Decide what to do after the current attempt failed with `e`.
    pub fn decide(&self, e: &RpcError) -> RetryDecision {
        match classify(e) {
            FaultClass::Fatal => RetryDecision::NoRetry,
            FaultClass::Restartable => {
                if self.attempt_count.saturating_add(1) >= self.settings.max_retries {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::RetryAfter(self.settings.backoff)
                }
            }
        }
    }

    /// Block for the backoff delay, then count the failed attempt.
    ///
    /// Fails with `Error::Interrupted` if the interrupt handle fires; the
    /// attempt is not counted in that case.
    pub fn sleep(&mut self) -> Result<()> {
        self.interrupt.sleep(self.settings.backoff)?;
        self.attempt_count += 1;
        Ok(())
    }
}

impl Clone for RetryPolicy {
    /// Same settings and counters, but an independent interrupt handle.
    fn clone(&self) -> Self {
        Self {
            settings: self.settings,
            attempt_count: self.attempt_count,
            last_selector: self.last_selector,
            interrupt: Interrupt::new(),
        }
    }
}
