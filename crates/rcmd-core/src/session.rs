//! The single remote session.
//!
//! [`RemoteSession`] owns at most one live transport. Every use of that
//! transport (connecting, running a command, closing) happens while holding
//! one async mutex, so a command's bytes and output are never interleaved
//! with another command's and two connects can never race into opening two
//! transports.
//!
//! # Lifecycle
//!
//! 1. Created empty from a validated [`ConnectionConfig`]
//! 2. `connect` opens a transport (or reuses a live one)
//! 3. `execute` runs one command, connecting implicitly if needed
//! 4. A transport that reports itself dead is discarded on next use
//! 5. `close` releases the transport; safe to repeat

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::error::{Error, Result};
use crate::transport::{CommandOutput, Connector, SshConnector, Transport};

/// One authenticated connection to the configured host.
pub struct RemoteSession<C: Connector> {
    /// Immutable endpoint settings.
    config: ConnectionConfig,
    /// Opens new transports.
    connector: C,
    /// The guard and the transport it protects (None = not connected).
    transport: Mutex<Option<C::Transport>>,
    /// Mirror of `transport.is_some()`, readable without the guard.
    connected: AtomicBool,
}

impl RemoteSession<SshConnector> {
    /// Create an SSH-backed session.
    pub fn ssh(config: ConnectionConfig) -> Result<Self> {
        Self::new(config, SshConnector::new())
    }
}

impl<C: Connector> RemoteSession<C> {
    /// Create a session without connecting.
    pub fn new(config: ConnectionConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            transport: Mutex::new(None),
            connected: AtomicBool::new(false),
        })
    }

    /// Endpoint settings.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Whether a transport is currently held.
    ///
    /// Never waits for the guard. A transport that died while idle still
    /// counts until the next operation notices.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connect, or verify and reuse the live transport.
    ///
    /// On failure nothing is retained and the session is not connected.
    pub async fn connect(&self) -> Result<()> {
        let mut slot = self.transport.lock().await;
        self.ensure_connected(&mut slot).await
    }

    /// Run `command` with the configured command timeout.
    pub async fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.execute_with_timeout(command, self.config.command_timeout)
            .await
    }

    /// Run `command`, bounded by `timeout`.
    ///
    /// Connects first if needed. The guard is held for the whole round trip,
    /// including the implicit connect.
    pub async fn execute_with_timeout(
        &self,
        command: &str,
        timeout: Duration,
    ) -> Result<CommandOutput> {
        let mut slot = self.transport.lock().await;
        self.ensure_connected(&mut slot).await?;

        let Some(transport) = slot.as_mut() else {
            return Err(Error::NotConnected);
        };

        debug!(command = %command, ?timeout, "Executing command");

        let finished = tokio::time::timeout(timeout, transport.exec(command)).await;
        let result = match finished {
            Ok(result) => result,
            Err(_) => {
                warn!(command = %command, ?timeout, "Command timed out");
                transport.abandon().await;
                return Err(Error::CommandTimeout {
                    command: command.to_string(),
                    timeout,
                });
            }
        };

        if let Err(e) = &result
            && (e.breaks_transport() || !transport.is_alive())
        {
            warn!(error = %e, "Transport dropped during command, discarding it");
            self.discard(&mut slot).await;
        }

        result
    }

    /// Release the transport. Idempotent and infallible.
    pub async fn close(&self) {
        let mut slot = self.transport.lock().await;
        if slot.is_some() {
            info!(addr = %self.config.address(), "Closing session");
        }
        self.discard(&mut slot).await;
    }

    /// Check-and-maybe-connect. Caller holds the guard.
    async fn ensure_connected(&self, slot: &mut Option<C::Transport>) -> Result<()> {
        if let Some(transport) = slot.as_ref() {
            if transport.is_alive() {
                return Ok(());
            }
            debug!("Existing transport is dead, reconnecting");
            self.discard(slot).await;
        }

        let timeout = self.config.connect_timeout;
        let connected = match tokio::time::timeout(timeout, self.connector.connect(&self.config)).await
        {
            Ok(result) => result,
            Err(_) => Err(Error::ConnectTimeout(timeout)),
        };

        match connected {
            Ok(transport) => {
                info!(addr = %self.config.address(), "Session connected");
                *slot = Some(transport);
                self.connected.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                warn!(addr = %self.config.address(), error = %e, "Connect failed");
                self.connected.store(false, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Drop the transport, closing it first. Caller holds the guard.
    async fn discard(&self, slot: &mut Option<C::Transport>) {
        if let Some(mut transport) = slot.take() {
            transport.close().await;
        }
        self.connected.store(false, Ordering::Release);
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    /// Transport that echoes the command and counts closes.
    struct EchoTransport {
        alive: Arc<AtomicBool>,
        closes: Arc<AtomicUsize>,
        abandoned: Arc<AtomicUsize>,
    }

    impl Transport for EchoTransport {
        async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
            if command == "sleep" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(CommandOutput {
                exit_code: 0,
                stdout: command.to_string(),
                stderr: String::new(),
            })
        }

        async fn abandon(&mut self) {
            self.abandoned.fetch_add(1, Ordering::SeqCst);
        }

        fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        async fn close(&mut self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[derive(Default)]
    struct CountingConnector {
        connects: Arc<AtomicUsize>,
        closes: Arc<AtomicUsize>,
        abandoned: Arc<AtomicUsize>,
        alive: Arc<AtomicBool>,
        refuse: bool,
    }

    impl Connector for CountingConnector {
        type Transport = EchoTransport;

        async fn connect(&self, _config: &ConnectionConfig) -> Result<EchoTransport> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            if self.refuse {
                return Err(Error::Connect {
                    message: "refused".into(),
                });
            }
            self.alive.store(true, Ordering::SeqCst);
            Ok(EchoTransport {
                alive: self.alive.clone(),
                closes: self.closes.clone(),
                abandoned: self.abandoned.clone(),
            })
        }
    }

    fn session(connector: CountingConnector) -> RemoteSession<CountingConnector> {
        RemoteSession::new(ConnectionConfig::new("testhost"), connector).unwrap()
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = RemoteSession::new(ConnectionConfig::new(""), CountingConnector::default());
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[tokio::test]
    async fn connect_reuses_live_transport() {
        let connector = CountingConnector::default();
        let connects = connector.connects.clone();
        let session = session(connector);

        session.connect().await.unwrap();
        session.connect().await.unwrap();

        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn connect_replaces_dead_transport() {
        let connector = CountingConnector::default();
        let connects = connector.connects.clone();
        let closes = connector.closes.clone();
        let alive = connector.alive.clone();
        let session = session(connector);

        session.connect().await.unwrap();
        alive.store(false, Ordering::SeqCst);
        session.connect().await.unwrap();

        assert_eq!(connects.load(Ordering::SeqCst), 2);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_connect_leaves_session_empty() {
        let session = session(CountingConnector {
            refuse: true,
            ..Default::default()
        });

        let err = session.connect().await.unwrap_err();
        assert!(err.is_connection());
        assert!(!session.is_connected());
    }

    #[tokio::test]
    async fn execute_connects_implicitly() {
        let connector = CountingConnector::default();
        let connects = connector.connects.clone();
        let session = session(connector);

        let output = session.execute("mpc status").await.unwrap();

        assert_eq!(output.stdout, "mpc status");
        assert_eq!(connects.load(Ordering::SeqCst), 1);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn execute_times_out_and_keeps_transport() {
        let connector = CountingConnector::default();
        let abandoned = connector.abandoned.clone();
        let session = session(connector);

        let err = session
            .execute_with_timeout("sleep", Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::CommandTimeout { .. }));
        assert!(err.is_execution());
        assert!(session.is_connected());
        assert_eq!(abandoned.load(Ordering::SeqCst), 1);
        assert_eq!(session.execute("after").await.unwrap().stdout, "after");
        assert_eq!(abandoned.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let connector = CountingConnector::default();
        let closes = connector.closes.clone();
        let session = session(connector);

        session.close().await;
        session.connect().await.unwrap();
        session.close().await;
        session.close().await;

        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(!session.is_connected());
    }
}
