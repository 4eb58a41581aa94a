//! SSH transport built on russh.
//!
//! One TCP connection and one authenticated SSH session per transport; every
//! command gets its own session channel, which is closed when the command
//! finishes.

use std::path::Path;
use std::sync::Arc;

use russh::client;
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::ExposeSecret;
use tracing::{debug, info, warn};

use super::{CommandOutput, Connector, Transport};
use crate::config::{AuthMethod, ConnectionConfig};
use crate::constants::{KEEPALIVE_MAX, SSH_EXTENDED_DATA_STDERR};
use crate::error::{Error, Result};

/// SSH client handler.
///
/// Unknown host keys are accepted with a warning; there is no known_hosts
/// store behind this client.
struct HostKeyHandler {
    address: String,
}

#[async_trait::async_trait]
impl client::Handler for HostKeyHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh_keys::key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        warn!(
            addr = %self.address,
            fingerprint = %server_public_key.fingerprint(),
            "Host key verification not implemented, accepting key"
        );
        Ok(true)
    }
}

/// Opens [`SshTransport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

impl SshConnector {
    /// Create a connector.
    pub fn new() -> Self {
        Self
    }
}

impl Connector for SshConnector {
    type Transport = SshTransport;

    async fn connect(&self, config: &ConnectionConfig) -> Result<SshTransport> {
        let addr = config.address();
        let user = config.effective_username();
        info!(addr = %addr, user = %user, "Connecting via SSH");

        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: None,
            keepalive_interval: config.keepalive_interval,
            keepalive_max: KEEPALIVE_MAX,
            ..Default::default()
        });

        let handler = HostKeyHandler {
            address: addr.clone(),
        };

        let mut handle = client::connect(ssh_config, addr.as_str(), handler)
            .await
            .map_err(|e| Error::Connect {
                message: format!("SSH connection to {} failed: {}", addr, e),
            })?;

        debug!("SSH connection established");

        let authenticated = match config.auth_method() {
            AuthMethod::Password(password) => {
                debug!("Authenticating with password");
                handle
                    .authenticate_password(user.as_str(), password.expose_secret())
                    .await
            }
            AuthMethod::KeyFile(path) => {
                debug!(path = %path.display(), "Authenticating with identity file");
                let key_pair = load_key(path).await?;
                handle
                    .authenticate_publickey(user.as_str(), Arc::new(key_pair))
                    .await
            }
            AuthMethod::None => {
                debug!("No credentials configured, trying none authentication");
                handle.authenticate_none(user.as_str()).await
            }
        }
        .map_err(|e| Error::Connect {
            message: format!("authentication exchange failed: {}", e),
        })?;

        if !authenticated {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "", "")
                .await;
            return Err(Error::AuthenticationFailed { user });
        }

        info!(addr = %addr, user = %user, "SSH authentication successful");

        Ok(SshTransport {
            handle,
            address: addr,
            running: None,
        })
    }
}

/// Load and decode a private key file.
async fn load_key(path: &Path) -> Result<russh_keys::key::KeyPair> {
    let key_data = tokio::fs::read(path).await.map_err(|e| Error::Connect {
        message: format!("failed to read identity file {}: {}", path.display(), e),
    })?;

    russh_keys::decode_secret_key(&String::from_utf8_lossy(&key_data), None).map_err(|e| {
        Error::Connect {
            message: format!("failed to decode private key: {}", e),
        }
    })
}

/// An authenticated SSH session.
pub struct SshTransport {
    handle: client::Handle<HostKeyHandler>,
    address: String,
    /// Channel of the command in flight. Outlives a cancelled `exec`.
    running: Option<Channel<client::Msg>>,
}

impl SshTransport {
    /// Remote `host:port`.
    pub fn address(&self) -> &str {
        &self.address
    }
}

/// Map a russh failure, distinguishing a dropped connection.
fn channel_error(
    handle: &client::Handle<HostKeyHandler>,
    context: &str,
    err: russh::Error,
) -> Error {
    if handle.is_closed() {
        debug!(error = %err, "{} failed on closed connection", context);
        Error::ConnectionClosed
    } else {
        Error::Execution {
            message: format!("{}: {}", context, err),
        }
    }
}

impl Transport for SshTransport {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        let channel = match self.handle.channel_open_session().await {
            Ok(channel) => channel,
            Err(e) => return Err(channel_error(&self.handle, "failed to open SSH channel", e)),
        };
        let channel = self.running.insert(channel);

        if let Err(e) = channel.exec(true, command).await {
            let err = channel_error(&self.handle, "failed to execute command", e);
            self.running = None;
            return Err(err);
        }

        debug!(command = %command, "Command sent");

        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut exit_code = None;
        let mut signal = None;

        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
                ChannelMsg::ExtendedData { data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    stderr.extend_from_slice(&data)
                }
                ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    signal = Some(format!("{:?}", signal_name))
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }
        self.running = None;

        let Some(exit_code) = exit_code else {
            if let Some(signal) = signal {
                return Err(Error::Execution {
                    message: format!("remote process terminated by signal {}", signal),
                });
            }
            if self.handle.is_closed() {
                return Err(Error::ConnectionClosed);
            }
            return Err(Error::Execution {
                message: "channel closed without an exit status".to_string(),
            });
        };

        debug!(
            command = %command,
            exit_code,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "Command finished"
        );

        Ok(CommandOutput {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        })
    }

    async fn abandon(&mut self) {
        let Some(channel) = self.running.take() else {
            return;
        };
        debug!(channel = ?channel.id(), "Closing abandoned channel");
        if let Err(e) = channel.eof().await {
            debug!(error = %e, "Failed to send EOF on abandoned channel");
        }
        if let Err(e) = channel.close().await {
            debug!(error = %e, "Failed to close abandoned channel");
        }
    }

    fn is_alive(&self) -> bool {
        !self.handle.is_closed()
    }

    async fn close(&mut self) {
        if self.handle.is_closed() {
            return;
        }
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "")
            .await
        {
            debug!(error = %e, "SSH disconnect failed");
        }
        info!(addr = %self.address, "SSH connection closed");
    }
}
