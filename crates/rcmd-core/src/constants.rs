//! Connection and dispatch constants for rcmd.

use std::time::Duration;

// =============================================================================
// Connection Constants
// =============================================================================

/// Default SSH port.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Time allowed for TCP connect, handshake and authentication.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Time allowed for a single command round trip.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// SSH keepalive interval while the session sits idle.
pub const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Unanswered keepalives before the transport is considered dead.
pub const KEEPALIVE_MAX: usize = 3;

/// Environment variable the client reads the password from by default.
pub const PASSWORD_ENV_VAR: &str = "RCMD_PASSWORD";

// =============================================================================
// Result Constants
// =============================================================================

/// Message reported when a command is submitted without a session.
pub const NOT_CONNECTED_MESSAGE: &str = "Not connected";

/// Message reported when a worker vanished before producing a result.
pub const ABORTED_MESSAGE: &str = "command aborted before completion";

/// SSH extended data stream number carrying stderr.
pub const SSH_EXTENDED_DATA_STDERR: u32 = 1;
