//! Classify call failures into restartable and fatal faults.

use crate::error::RpcError;

/// How the retry loop treats a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Transport became unusable in a way a reconnect can fix
    /// (not open, end of file, timed out, unknown).
    Restartable,
    /// Application faults and the remaining transport kinds. Never retried.
    Fatal,
}

/// Classify an error returned by the underlying client.
pub fn classify(e: &RpcError) -> FaultClass {
    match e {
        RpcError::Transport(t) if t.is_restartable() => FaultClass::Restartable,
        RpcError::Transport(_) | RpcError::Application(_) => FaultClass::Fatal,
    }
}
