//! Connection configuration.
//!
//! A [`ConnectionConfig`] describes the single remote endpoint a session talks
//! to. It is built once, validated, and then owned immutably by the session.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::constants::{
    DEFAULT_COMMAND_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_KEEPALIVE_INTERVAL, DEFAULT_SSH_PORT,
};
use crate::error::{Error, Result};

/// How the session authenticates.
///
/// Exactly one method is attempted per connect.
#[derive(Debug, Clone, Copy)]
pub enum AuthMethod<'a> {
    /// Password authentication. Wins when both a password and a key are set.
    Password(&'a SecretString),
    /// Public key authentication with a private key file.
    KeyFile(&'a Path),
    /// "none" authentication, for hosts that allow it.
    None,
}

/// Settings for the single remote endpoint.
pub struct ConnectionConfig {
    /// Remote host name or address.
    pub host: String,
    /// Remote SSH port.
    pub port: u16,
    /// Login user. Falls back to `$USER` when unset.
    pub username: Option<String>,
    /// Password, never logged.
    pub password: Option<SecretString>,
    /// Private key file used when no password is given.
    pub identity_file: Option<PathBuf>,
    /// Bound on TCP connect, handshake and authentication.
    pub connect_timeout: Duration,
    /// Default bound on one command round trip.
    pub command_timeout: Duration,
    /// SSH keepalive interval (None disables).
    pub keepalive_interval: Option<Duration>,
}

impl ConnectionConfig {
    /// Create a config for `host` with default port and timeouts.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            username: None,
            password: None,
            identity_file: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            keepalive_interval: Some(DEFAULT_KEEPALIVE_INTERVAL),
        }
    }

    /// Set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the login user.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the private key file.
    pub fn with_identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Set the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the default command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the keepalive interval.
    pub fn with_keepalive_interval(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Reject configurations that can never connect.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::InvalidConfig {
                message: "host must not be empty".to_string(),
            });
        }
        if self.port == 0 {
            return Err(Error::InvalidConfig {
                message: "port must be between 1 and 65535".to_string(),
            });
        }
        if self.connect_timeout.is_zero() || self.command_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                message: "timeouts must be non-zero".to_string(),
            });
        }
        Ok(())
    }

    /// `host:port` for socket connection and logging.
    ///
    /// IPv6 literals are bracketed (`[::1]:22`).
    pub fn address(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Login user, from the config or the local environment.
    pub fn effective_username(&self) -> String {
        self.username
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .or_else(|| std::env::var("USERNAME").ok())
            .unwrap_or_else(|| "root".to_string())
    }

    /// Resolve the authentication method (password, then key file, then none).
    pub fn auth_method(&self) -> AuthMethod<'_> {
        if let Some(password) = &self.password
            && !password.expose_secret().is_empty()
        {
            return AuthMethod::Password(password);
        }
        match &self.identity_file {
            Some(path) => AuthMethod::KeyFile(path),
            None => AuthMethod::None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("identity_file", &self.identity_file)
            .field("connect_timeout", &self.connect_timeout)
            .field("command_timeout", &self.command_timeout)
            .field("keepalive_interval", &self.keepalive_interval)
            .finish()
    }
}
