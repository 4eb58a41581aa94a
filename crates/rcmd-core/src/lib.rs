//! rcmd-core: one remote shell session, many concurrent callers.
//!
//! This crate provides:
//! - Connection configuration and error types
//! - A transport abstraction with an SSH implementation (russh)
//! - `RemoteSession`: guarded connect / execute / close on one transport
//! - `CommandDispatcher`: fire-and-forget submission with per-request results
//! - Logging setup

pub mod command;
pub mod config;
pub mod constants;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod session;
pub mod transport;

pub use command::{CommandOutcome, CommandRequest, CommandResult, RequestId, RequestState};
pub use config::{AuthMethod, ConnectionConfig};
pub use dispatcher::{
    CommandDispatcher, CommandHandle, ConnectionStatus, DispatchEvent, DispatchEvents, InFlight,
};
pub use error::{Error, ErrorKind, Result};
pub use logging::{LogFormat, init_logging};
pub use session::RemoteSession;
pub use transport::{CommandOutput, Connector, SshConnector, SshTransport, Transport};
