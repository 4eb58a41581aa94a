//! Command request and result types.

use std::fmt;
use std::time::Instant;

use crate::constants::{ABORTED_MESSAGE, NOT_CONNECTED_MESSAGE};
use crate::error::Error;
use crate::transport::CommandOutput;

/// Identifier of a submitted command, increasing in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestId(pub u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A command accepted by the dispatcher.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Ordering token.
    pub id: RequestId,
    /// Command text, passed to the remote shell unmodified.
    pub command: String,
    /// When `submit` was called.
    pub submitted_at: Instant,
}

impl CommandRequest {
    /// Create a request stamped with the current time.
    pub fn new(id: RequestId, command: impl Into<String>) -> Self {
        Self {
            id,
            command: command.into(),
            submitted_at: Instant::now(),
        }
    }
}

/// Lifecycle of a submitted request.
///
/// `Created -> Executing -> Completed`; no state is revisited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Accepted, worker not yet running.
    Created,
    /// Worker is waiting for or holding the session.
    Executing,
    /// Result delivered.
    Completed { succeeded: bool },
}

/// User-facing outcome of one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// True only when the remote exit status was zero.
    pub succeeded: bool,
    /// Stdout, else stderr, else `Exit code: N`; or the failure reason.
    pub message: String,
}

impl CommandResult {
    /// Build a result from a completed round trip.
    ///
    /// A non-zero exit is a failed result, not an error.
    pub fn from_output(output: &CommandOutput) -> Self {
        let stdout = output.stdout.trim();
        let stderr = output.stderr.trim();
        let message = if !stdout.is_empty() {
            stdout.to_string()
        } else if !stderr.is_empty() {
            stderr.to_string()
        } else {
            format!("Exit code: {}", output.exit_code)
        };

        Self {
            succeeded: output.exit_code == 0,
            message,
        }
    }

    /// Build a failed result from an error.
    pub fn from_error(error: &Error) -> Self {
        Self::failure(error.to_string())
    }

    /// Failed result with the given message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            message: message.into(),
        }
    }

    /// Synthetic result for a submission without a session.
    pub fn not_connected() -> Self {
        Self::failure(NOT_CONNECTED_MESSAGE)
    }

    /// Result for a worker that disappeared before finishing.
    pub fn aborted() -> Self {
        Self::failure(ABORTED_MESSAGE)
    }
}

impl fmt::Display for CommandResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.succeeded { "OK" } else { "ERROR" };
        write!(f, "{}: {}", tag, self.message)
    }
}

/// A delivered result together with the request it answers.
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub id: RequestId,
    pub command: String,
    pub result: CommandResult,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn output(exit_code: u32, stdout: &str, stderr: &str) -> CommandOutput {
        CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    #[test]
    fn success_uses_stdout() {
        let result = CommandResult::from_output(&output(0, "volume: 50%", ""));
        assert_eq!(
            result,
            CommandResult {
                succeeded: true,
                message: "volume: 50%".into()
            }
        );
    }

    #[test]
    fn failure_falls_back_to_stderr() {
        let result = CommandResult::from_output(&output(1, "", "MPD not running"));
        assert!(!result.succeeded);
        assert_eq!(result.message, "MPD not running");
    }

    #[test]
    fn silent_failure_reports_exit_code() {
        let result = CommandResult::from_output(&output(2, "", ""));
        assert!(!result.succeeded);
        assert_eq!(result.message, "Exit code: 2");
    }

    #[test]
    fn whitespace_only_output_counts_as_empty() {
        let result = CommandResult::from_output(&output(0, "\n  \n", "\n"));
        assert!(result.succeeded);
        assert_eq!(result.message, "Exit code: 0");
    }

    #[test]
    fn stdout_is_trimmed() {
        let result = CommandResult::from_output(&output(0, "  playing\n", "warning"));
        assert_eq!(result.message, "playing");
    }

    #[test]
    fn not_connected_result() {
        let result = CommandResult::not_connected();
        assert!(!result.succeeded);
        assert_eq!(result.message, "Not connected");
    }

    #[test]
    fn error_result_carries_reason() {
        let result = CommandResult::from_error(&Error::ConnectionClosed);
        assert!(!result.succeeded);
        assert_eq!(result.message, "connection closed");
    }

    #[test]
    fn display_tags_outcome() {
        assert_eq!(
            CommandResult::from_output(&output(0, "ok", "")).to_string(),
            "OK: ok"
        );
        assert_eq!(CommandResult::not_connected().to_string(), "ERROR: Not connected");
    }

    #[test]
    fn request_id_display() {
        assert_eq!(RequestId(7).to_string(), "#7");
        assert!(RequestId(1) < RequestId(2));
    }

    proptest! {
        #[test]
        fn succeeded_iff_exit_zero(code in 0u32..256, stdout in ".*", stderr in ".*") {
            let result = CommandResult::from_output(&output(code, &stdout, &stderr));
            prop_assert_eq!(result.succeeded, code == 0);
        }

        #[test]
        fn message_never_empty(code in 0u32..256, stdout in "\\s*[a-z]*", stderr in "\\s*[a-z]*") {
            let result = CommandResult::from_output(&output(code, &stdout, &stderr));
            prop_assert!(!result.message.is_empty());
        }

        #[test]
        fn stdout_wins_when_present(code in 0u32..256, stdout in "[a-z]{1,16}", stderr in "[a-z]{0,16}") {
            let result = CommandResult::from_output(&output(code, &stdout, &stderr));
            prop_assert_eq!(result.message, stdout);
        }
    }
}
