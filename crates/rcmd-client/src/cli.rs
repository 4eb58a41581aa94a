//! Client CLI implementation.
//!
//! Provides command-line argument parsing using clap.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use secrecy::SecretString;

use rcmd_core::constants::{DEFAULT_SSH_PORT, PASSWORD_ENV_VAR};
use rcmd_core::{ConnectionConfig, Error, Result};

/// Log output format for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum CliLogFormat {
    /// Human-readable text output.
    #[default]
    Text,
    /// Structured JSON output.
    Json,
}

impl From<CliLogFormat> for rcmd_core::LogFormat {
    fn from(fmt: CliLogFormat) -> Self {
        match fmt {
            CliLogFormat::Text => rcmd_core::LogFormat::Text,
            CliLogFormat::Json => rcmd_core::LogFormat::Json,
        }
    }
}

/// Run commands on a remote host over one shared SSH session.
#[derive(Debug, Parser)]
#[command(
    name = "rcmd",
    version,
    about = "Run commands on a remote host over one shared SSH session"
)]
pub struct Cli {
    /// Remote host ([user@]host[:port])
    pub destination: String,

    /// Command to run once and exit (interactive console when omitted)
    #[arg(trailing_var_arg = true)]
    pub command: Vec<String>,

    /// SSH port to connect to (a port in the destination takes precedence)
    #[arg(short = 'p', long, default_value_t = DEFAULT_SSH_PORT)]
    pub port: u16,

    /// Login user name (overrides user@ in destination)
    #[arg(short = 'l', long, value_name = "USER")]
    pub login: Option<String>,

    /// Private key file for public key authentication
    #[arg(short = 'i', long = "identity", value_name = "PATH", env = "RCMD_IDENTITY")]
    pub identity: Option<PathBuf>,

    /// Environment variable holding the password
    #[arg(long = "password-env", value_name = "VAR", default_value = PASSWORD_ENV_VAR)]
    pub password_env: String,

    /// Connect timeout in seconds (TCP, handshake and authentication)
    #[arg(long = "connect-timeout", value_name = "SECS", default_value_t = 5)]
    pub connect_timeout_secs: u64,

    /// Per-command timeout in seconds
    #[arg(long = "command-timeout", value_name = "SECS", default_value_t = 10)]
    pub command_timeout_secs: u64,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log file path (logs to stderr when omitted)
    #[arg(long = "log-file", value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// Log output format
    #[arg(long = "log-format", default_value = "text", value_enum)]
    pub log_format: CliLogFormat,
}

impl Cli {
    /// Split the destination into user and `host[:port]`.
    pub fn parse_destination(&self) -> (Option<&str>, &str) {
        match self.destination.split_once('@') {
            Some((user, rest)) => (Some(user), rest),
            None => (None, self.destination.as_str()),
        }
    }

    /// Get the effective user (from -l option or destination).
    pub fn effective_user(&self) -> Option<&str> {
        if let Some(ref login) = self.login {
            return Some(login.as_str());
        }
        self.parse_destination().0.filter(|user| !user.is_empty())
    }

    /// Get the host from the destination.
    pub fn host(&self) -> &str {
        split_host_port(self.parse_destination().1).0
    }

    /// Port from the destination, or `-p`.
    pub fn effective_port(&self) -> Result<u16> {
        match split_host_port(self.parse_destination().1).1 {
            Some(port) => port.parse().map_err(|_| Error::InvalidConfig {
                message: format!("invalid port in destination: {}", port),
            }),
            None => Ok(self.port),
        }
    }

    /// Connection timeout.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    /// The one-shot command, if any, joined the way ssh joins it.
    pub fn command_string(&self) -> Option<String> {
        if self.command.is_empty() {
            None
        } else {
            Some(self.command.join(" "))
        }
    }

    /// Build and validate the session configuration.
    ///
    /// The password is read from the environment variable named by
    /// `--password-env`; an empty value counts as unset.
    pub fn connection_config(&self) -> Result<ConnectionConfig> {
        let mut config = ConnectionConfig::new(self.host())
            .with_port(self.effective_port()?)
            .with_connect_timeout(self.connect_timeout())
            .with_command_timeout(self.command_timeout());

        if let Some(user) = self.effective_user() {
            config = config.with_username(user);
        }
        if let Some(ref identity) = self.identity {
            config = config.with_identity_file(identity);
        }
        config.password = std::env::var(&self.password_env)
            .ok()
            .filter(|password| !password.is_empty())
            .map(SecretString::from);

        config.validate()?;
        Ok(config)
    }
}

// `host:port`, leaving bare IPv6 literals alone.
fn split_host_port(s: &str) -> (&str, Option<&str>) {
    match s.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => (host, Some(port)),
        _ => (s, None),
    }
}
