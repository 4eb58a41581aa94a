//! Error types for rcmd-core.

use std::time::Duration;

use thiserror::Error;

/// Main error type for rcmd operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Connection configuration rejected before any network activity.
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Could not reach or negotiate with the remote host.
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// The remote host rejected the supplied credentials.
    #[error("authentication failed for {user}")]
    AuthenticationFailed { user: String },

    /// Connecting took longer than the configured timeout.
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    /// The command round trip failed after the session was established.
    #[error("command failed: {message}")]
    Execution { message: String },

    /// The command did not finish within its timeout.
    #[error("command timed out after {timeout:?}: {command}")]
    CommandTimeout { command: String, timeout: Duration },

    /// The transport went away underneath an operation.
    #[error("connection closed")]
    ConnectionClosed,

    /// A command was submitted while no session is established.
    #[error("Not connected")]
    NotConnected,

    /// The dispatcher is shutting down and no longer accepts work.
    #[error("dispatcher is shut down")]
    Shutdown,
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Establishing the session failed.
    Connection,
    /// A round trip on an established session failed.
    Execution,
    /// The request was refused locally because of dispatcher/session state.
    State,
    /// The configuration is unusable.
    Config,
}

impl Error {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidConfig { .. } => ErrorKind::Config,
            Error::Connect { .. } | Error::AuthenticationFailed { .. } | Error::ConnectTimeout(_) => {
                ErrorKind::Connection
            }
            Error::Io(_)
            | Error::Execution { .. }
            | Error::CommandTimeout { .. }
            | Error::ConnectionClosed => ErrorKind::Execution,
            Error::NotConnected | Error::Shutdown => ErrorKind::State,
        }
    }

    /// Returns true if the session could not be established.
    pub fn is_connection(&self) -> bool {
        self.kind() == ErrorKind::Connection
    }

    /// Returns true if an established session failed mid-command.
    pub fn is_execution(&self) -> bool {
        self.kind() == ErrorKind::Execution
    }

    /// Returns true if the transport should be considered broken after this error.
    ///
    /// A command timeout only abandons the command's own channel, so it does
    /// not count.
    pub fn breaks_transport(&self) -> bool {
        matches!(self, Error::ConnectionClosed | Error::Io(_))
    }
}

/// Convenience result type for rcmd operations.
pub type Result<T> = std::result::Result<T, Error>;
