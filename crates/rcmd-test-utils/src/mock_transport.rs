//! Mock transport for testing without real network.
//!
//! [`MockConnector`] hands out [`MockTransport`]s that answer commands from a
//! script and record every connect, round trip and close in a shared log, so
//! tests can assert on ordering and call counts.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rcmd_core::config::ConnectionConfig;
use rcmd_core::error::{Error, Result};
use rcmd_core::transport::{CommandOutput, Connector, Transport};

/// Something the mock observed, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A transport was opened (1-based attempt number).
    Connect { attempt: usize },
    /// A command was written.
    Begin { command: String },
    /// A command's output and exit status were read.
    End { command: String },
    /// A cancelled command's leftovers were released.
    Abandon { command: String },
    /// A transport was closed.
    Close,
}

/// Scripted reply to one command.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Finish normally after `delay`.
    Output {
        exit_code: u32,
        stdout: String,
        stderr: String,
        delay: Duration,
    },
    /// The connection drops mid-command.
    Drop,
    /// Never finish.
    Hang,
}

impl MockResponse {
    /// Exit 0 with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self::exit(0, stdout, "")
    }

    /// Arbitrary exit status and output.
    pub fn exit(exit_code: u32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        MockResponse::Output {
            exit_code,
            stdout: stdout.into(),
            stderr: stderr.into(),
            delay: Duration::ZERO,
        }
    }

    /// Delay an `Output` response.
    pub fn with_delay(self, delay: Duration) -> Self {
        match self {
            MockResponse::Output {
                exit_code,
                stdout,
                stderr,
                ..
            } => MockResponse::Output {
                exit_code,
                stdout,
                stderr,
                delay,
            },
            other => other,
        }
    }
}

#[derive(Debug)]
struct MockState {
    log: Mutex<Vec<TransportEvent>>,
    responses: Mutex<HashMap<String, MockResponse>>,
    default_delay: Mutex<Duration>,
    connect_delay: Mutex<Duration>,
    failing_connects: AtomicUsize,
    connects: AtomicUsize,
    execs: AtomicUsize,
    closes: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    current: Mutex<Option<Arc<AtomicBool>>>,
}

// Helper to lock a std Mutex without panicking on poison
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl MockState {
    fn record(&self, event: TransportEvent) {
        lock(&self.log).push(event);
    }
}

/// Connector producing scripted transports. Clones share state.
#[derive(Debug, Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Create a connector whose transports echo unknown commands with exit 0.
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                log: Mutex::new(Vec::new()),
                responses: Mutex::new(HashMap::new()),
                default_delay: Mutex::new(Duration::ZERO),
                connect_delay: Mutex::new(Duration::ZERO),
                failing_connects: AtomicUsize::new(0),
                connects: AtomicUsize::new(0),
                execs: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                current: Mutex::new(None),
            }),
        }
    }

    /// Script the reply for `command`.
    pub fn respond(&self, command: impl Into<String>, response: MockResponse) -> &Self {
        lock(&self.state.responses).insert(command.into(), response);
        self
    }

    /// Delay applied to unscripted (echoed) commands.
    pub fn set_default_delay(&self, delay: Duration) -> &Self {
        *lock(&self.state.default_delay) = delay;
        self
    }

    /// Delay applied to every connect attempt.
    pub fn set_connect_delay(&self, delay: Duration) -> &Self {
        *lock(&self.state.connect_delay) = delay;
        self
    }

    /// Make the next `n` connect attempts fail authentication.
    pub fn fail_next_connects(&self, n: usize) -> &Self {
        self.state.failing_connects.store(n, Ordering::SeqCst);
        self
    }

    /// Kill the most recent transport while it sits idle.
    pub fn drop_connection(&self) {
        if let Some(alive) = lock(&self.state.current).as_ref() {
            alive.store(false, Ordering::SeqCst);
        }
    }

    /// Everything observed so far.
    pub fn events(&self) -> Vec<TransportEvent> {
        lock(&self.state.log).clone()
    }

    /// Connect attempts, including failed ones.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Commands started.
    pub fn exec_count(&self) -> usize {
        self.state.execs.load(Ordering::SeqCst)
    }

    /// Transports closed.
    pub fn close_count(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Total calls of any kind into the network layer.
    pub fn total_calls(&self) -> usize {
        self.connect_count() + self.exec_count() + self.close_count()
    }

    /// Highest number of commands ever running at the same time.
    pub fn max_concurrent_execs(&self) -> usize {
        self.state.max_active.load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    type Transport = MockTransport;

    async fn connect(&self, _config: &ConnectionConfig) -> Result<MockTransport> {
        let attempt = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;

        let delay = *lock(&self.state.connect_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let refused = self
            .state
            .failing_connects
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(Error::AuthenticationFailed {
                user: "mock".to_string(),
            });
        }

        self.state.record(TransportEvent::Connect { attempt });

        let alive = Arc::new(AtomicBool::new(true));
        *lock(&self.state.current) = Some(alive.clone());

        Ok(MockTransport {
            state: self.state.clone(),
            alive,
            running: None,
        })
    }
}

/// Transport answering from the connector's script.
#[derive(Debug)]
pub struct MockTransport {
    state: Arc<MockState>,
    alive: Arc<AtomicBool>,
    /// Command begun but not finished.
    running: Option<String>,
}

/// Decrements the active-command counter even when the exec future is dropped.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Transport for MockTransport {
    async fn exec(&mut self, command: &str) -> Result<CommandOutput> {
        if !self.alive.load(Ordering::SeqCst) {
            return Err(Error::ConnectionClosed);
        }

        self.state.execs.fetch_add(1, Ordering::SeqCst);
        let active = self.state.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_active.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveGuard(&self.state.active);

        self.state.record(TransportEvent::Begin {
            command: command.to_string(),
        });
        self.running = Some(command.to_string());

        // Give other tasks a chance to interleave if the caller forgot to serialize.
        tokio::task::yield_now().await;

        let response = lock(&self.state.responses).get(command).cloned();
        let response = response.unwrap_or_else(|| {
            MockResponse::ok(command).with_delay(*lock(&self.state.default_delay))
        });

        let output = match response {
            MockResponse::Output {
                exit_code,
                stdout,
                stderr,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                CommandOutput {
                    exit_code,
                    stdout,
                    stderr,
                }
            }
            MockResponse::Drop => {
                self.running = None;
                self.alive.store(false, Ordering::SeqCst);
                return Err(Error::ConnectionClosed);
            }
            MockResponse::Hang => std::future::pending().await,
        };

        self.running = None;
        self.state.record(TransportEvent::End {
            command: command.to_string(),
        });

        Ok(output)
    }

    async fn abandon(&mut self) {
        if let Some(command) = self.running.take() {
            self.state.record(TransportEvent::Abandon { command });
        }
    }

    fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    async fn close(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        self.state.closes.fetch_add(1, Ordering::SeqCst);
        self.state.record(TransportEvent::Close);
    }
}

// =============================================================================
// Tests
// =============================================================================
