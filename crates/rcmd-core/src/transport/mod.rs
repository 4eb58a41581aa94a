//! Transport abstraction for remote command execution.
//!
//! The session only needs three things from the network: open an
//! authenticated connection, run one command to completion, and tear the
//! connection down. [`Connector`] and [`Transport`] capture exactly that so
//! the session and dispatcher can run against SSH or an in-memory double.

mod ssh;

use std::future::Future;

use crate::config::ConnectionConfig;
use crate::error::Result;

pub use ssh::{SshConnector, SshTransport};

/// Everything a finished remote process produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Remote exit status.
    pub exit_code: u32,
    /// Standard output, decoded lossily.
    pub stdout: String,
    /// Standard error, decoded lossily.
    pub stderr: String,
}

// =============================================================================
// Transport Trait
// =============================================================================

/// A live, authenticated connection to the remote host.
///
/// Callers must not run two commands on one transport at the same time;
/// `RemoteSession` enforces that with its guard.
pub trait Transport: Send {
    /// Run `command` and wait for its output and exit status.
    ///
    /// Returns `Error::ConnectionClosed` when the connection dropped
    /// mid-command.
    fn exec(&mut self, command: &str) -> impl Future<Output = Result<CommandOutput>> + Send;

    /// Release what a cancelled `exec` left open on the remote side.
    ///
    /// Called after an `exec` future was dropped before finishing, e.g. on
    /// timeout. A no-op when nothing is outstanding. Must not fail.
    fn abandon(&mut self) -> impl Future<Output = ()> + Send;

    /// Check whether the connection is still usable.
    fn is_alive(&self) -> bool;

    /// Close the connection. Must not fail.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

// =============================================================================
// Connector Trait
// =============================================================================

/// Opens transports for a configuration.
pub trait Connector: Send + Sync + 'static {
    /// The transport type produced by this connector.
    type Transport: Transport + 'static;

    /// Connect and authenticate.
    ///
    /// The caller applies the connect timeout.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Transport>> + Send;
}
