//! Error types shared by the resolver, retry loop and pool.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Boxed error raised by the remote operation itself.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Discriminates why a transport became unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    Unknown,
    NotOpen,
    AlreadyOpen,
    TimedOut,
    EndOfFile,
    CorruptedData,
}

impl TransportErrorKind {
    /// Faults that are safe to recover from by reconnecting and retrying.
    pub fn is_restartable(self) -> bool {
        matches!(
            self,
            TransportErrorKind::NotOpen
                | TransportErrorKind::EndOfFile
                | TransportErrorKind::TimedOut
                | TransportErrorKind::Unknown
        )
    }

    /// Map an io error onto the transport fault it represents.
    pub fn from_io(e: &io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::NotConnected
            | io::ErrorKind::AddrNotAvailable => TransportErrorKind::NotOpen,
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TransportErrorKind::TimedOut,
            io::ErrorKind::UnexpectedEof => TransportErrorKind::EndOfFile,
            io::ErrorKind::InvalidData => TransportErrorKind::CorruptedData,
            _ => TransportErrorKind::Unknown,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransportErrorKind::Unknown => "unknown",
            TransportErrorKind::NotOpen => "not open",
            TransportErrorKind::AlreadyOpen => "already open",
            TransportErrorKind::TimedOut => "timed out",
            TransportErrorKind::EndOfFile => "end of file",
            TransportErrorKind::CorruptedData => "corrupted data",
        };
        f.write_str(s)
    }
}

/// Transport-level failure signalled by a transport or client.
#[derive(Debug, Error)]
#[error("transport fault ({kind}): {message}")]
pub struct TransportError {
    kind: TransportErrorKind,
    message: String,
    #[source]
    source: Option<io::Error>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Wrap an io error, deriving the kind from `io::ErrorKind`.
    pub fn from_io(e: io::Error, context: impl Into<String>) -> Self {
        Self {
            kind: TransportErrorKind::from_io(&e),
            message: context.into(),
            source: Some(e),
        }
    }

    pub fn kind(&self) -> TransportErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_restartable(&self) -> bool {
        self.kind.is_restartable()
    }
}

/// Error returned by an operation dispatched to the underlying client.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The connection failed; may be retried if the kind is restartable.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The remote operation itself failed. Never retried.
    #[error("application fault: {0}")]
    Application(#[source] BoxError),
}

impl RpcError {
    pub fn application(e: impl Into<BoxError>) -> Self {
        RpcError::Application(e.into())
    }
}

/// Errors surfaced to callers of the pool and proxy.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The resolver holds no endpoints.
    #[error("no endpoints configured")]
    NoEndpoints,
    /// A transport fault that was not retried or was the final one.
    #[error(transparent)]
    Transport(#[from] TransportError),
    /// The remote operation failed.
    #[error("application fault: {0}")]
    Application(#[source] BoxError),
    /// The retry budget ran out while facing restartable faults.
    #[error("retries exhausted after {attempts} attempt(s)")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last: Option<TransportError>,
    },
    /// No pooled object became available within the wait ceiling.
    #[error("pool exhausted: no client available within {waited:?}")]
    PoolExhausted { waited: Duration },
    /// A backoff sleep was interrupted.
    #[error("interrupted while backing off")]
    Interrupted,
    /// `borrow` was called before `init` or after `destroy`.
    #[error("client pool is not initialized")]
    NotInitialized,
    #[error("client pool is closed")]
    PoolClosed,
    /// A freshly created object failed validation.
    #[error("pooled object failed validation: {0}")]
    Validation(String),
}

impl From<RpcError> for Error {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Transport(t) => Error::Transport(t),
            RpcError::Application(a) => Error::Application(a),
        }
    }
}
