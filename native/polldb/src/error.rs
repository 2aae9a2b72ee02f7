//! Error types for PollDb.
//!
//! Errors that happen while preparing work (wrong state, bad option) fail the
//! originating call. Errors raised while a statement executes never show up here:
//! they are captured into the job's `QueryResult` and delivered to the callback.

use thiserror::Error;

/// Main error type for connection-level operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Handshake or option failure while connecting. The connection must be discarded.
    #[error("{message}")]
    Connect { message: String },

    /// The operation needs an established session.
    #[error("Attempted to use a disconnected database")]
    NotConnected,

    /// `connect` was called on a connection that is not in the disconnected state.
    #[error("Attempted to connect an already connected database")]
    AlreadyConnected,

    /// Disconnection was requested or the connection has been released.
    #[error("Attempted to use a shutdown database")]
    Shutdown,

    /// An option or character set could not be applied.
    #[error("{message}")]
    Option { message: String },

    /// The worker thread could not be started.
    #[error("Failed to start worker: {0}")]
    Worker(String),

    /// A mutex guarding shared state was poisoned.
    #[error("Mutex poisoned in {0}")]
    LockPoisoned(String),
}

impl Error {
    /// Creates a connect error carrying the native diagnostic text.
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    /// Creates an option error carrying the native diagnostic text.
    pub fn option(message: impl Into<String>) -> Self {
        Self::Option {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for rustler::Error {
    fn from(err: Error) -> Self {
        rustler::Error::Term(Box::new(err.to_string()))
    }
}
