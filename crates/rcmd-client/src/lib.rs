//! rcmd-client: command-line front end for rcmd.
//!
//! Provides:
//! - CLI argument parsing
//! - Console input parsing and the `mpc` player vocabulary
//! - The interactive console and one-shot runner

pub mod cli;
pub mod console;
pub mod player;

pub use cli::{Cli, CliLogFormat};
pub use console::{Console, Step, format_event, print_events, run_once};
pub use player::{ConsoleInput, InputError, PlayerCommand, parse_line};
