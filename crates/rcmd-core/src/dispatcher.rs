//! Concurrent command dispatch.
//!
//! [`CommandDispatcher`] lets callers fire a command and carry on. Each
//! submission becomes one task in a dispatcher-owned [`JoinSet`]; the tasks
//! contend for the shared [`RemoteSession`], whose guard serializes the
//! actual round trips. Completion order therefore follows the guard, not
//! submission order.
//!
//! Every submission produces exactly one [`DispatchEvent::Completed`] on the
//! event channel handed out by [`CommandDispatcher::new`]. The channel has a
//! single consumer, so deliveries to it are naturally serialized.
//!
//! # Bookkeeping
//!
//! A request enters the in-flight set when its task is spawned. The task
//! owns a [`Ticket`]; completing the ticket removes the request and delivers
//! the result. If the task is aborted or panics, the ticket's `Drop` delivers
//! an "aborted" result instead, so no request is ever left without one.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::command::{CommandOutcome, CommandRequest, CommandResult, RequestId, RequestState};
use crate::session::RemoteSession;
use crate::transport::Connector;

/// Connection state as reported to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// A connect attempt is running.
    Connecting,
    /// The session holds a live transport.
    Connected,
    /// The session was closed.
    Disconnected,
    /// Connecting failed; carries the cause.
    Failed(String),
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Notification delivered to the dispatcher's sink.
#[derive(Debug, Clone)]
pub enum DispatchEvent {
    /// A submitted command reached a terminal state.
    Completed(CommandOutcome),
    /// The connection status changed.
    Status(ConnectionStatus),
}

/// Receiving end of the dispatcher's sink.
pub type DispatchEvents = mpsc::UnboundedReceiver<DispatchEvent>;

type EventSender = mpsc::UnboundedSender<DispatchEvent>;

// Helper to lock a std Mutex without panicking on poison
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// =============================================================================
// In-flight set
// =============================================================================

/// Snapshot of an outstanding request.
#[derive(Debug, Clone)]
pub struct InFlight {
    pub request: CommandRequest,
    pub state: RequestState,
}

#[derive(Debug, Default)]
struct InFlightSet {
    entries: Mutex<HashMap<RequestId, InFlight>>,
}

impl InFlightSet {
    fn insert(&self, request: CommandRequest) {
        let id = request.id;
        let entry = InFlight {
            request,
            state: RequestState::Created,
        };
        lock(&self.entries).insert(id, entry);
    }

    fn set_state(&self, id: RequestId, state: RequestState) {
        if let Some(entry) = lock(&self.entries).get_mut(&id) {
            entry.state = state;
        }
    }

    fn remove(&self, id: RequestId) -> bool {
        lock(&self.entries).remove(&id).is_some()
    }

    fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    fn snapshot(&self) -> Vec<InFlight> {
        let mut entries: Vec<_> = lock(&self.entries).values().cloned().collect();
        entries.sort_by_key(|entry| entry.request.id);
        entries
    }
}

/// Exactly-once delivery for one dispatched request.
struct Ticket {
    id: RequestId,
    command: String,
    in_flight: Arc<InFlightSet>,
    events: EventSender,
    reply: Option<oneshot::Sender<CommandResult>>,
}

impl Ticket {
    fn start(&self) {
        self.in_flight.set_state(self.id, RequestState::Executing);
    }

    fn complete(mut self, result: CommandResult) {
        self.deliver(result);
    }

    fn deliver(&mut self, result: CommandResult) {
        let Some(reply) = self.reply.take() else {
            return;
        };

        self.in_flight.set_state(
            self.id,
            RequestState::Completed {
                succeeded: result.succeeded,
            },
        );
        self.in_flight.remove(self.id);

        debug!(id = %self.id, succeeded = result.succeeded, "Delivering result");

        let outcome = CommandOutcome {
            id: self.id,
            command: std::mem::take(&mut self.command),
            result: result.clone(),
        };
        let _ = self.events.send(DispatchEvent::Completed(outcome));
        let _ = reply.send(result);
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if self.reply.is_some() {
            warn!(id = %self.id, "Command task ended without a result");
            self.deliver(CommandResult::aborted());
        }
    }
}

// =============================================================================
// Command handle
// =============================================================================

/// Handle to a submitted command.
///
/// Awaiting it yields the same result that was sent to the event sink.
/// Dropping it does not cancel the command.
#[derive(Debug)]
pub struct CommandHandle {
    id: RequestId,
    rx: oneshot::Receiver<CommandResult>,
}

impl CommandHandle {
    /// The request's identifier.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the result.
    pub async fn result(self) -> CommandResult {
        self.rx.await.unwrap_or_else(|_| CommandResult::aborted())
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Runs commands against one shared session without blocking the caller.
pub struct CommandDispatcher<C: Connector> {
    session: Arc<RemoteSession<C>>,
    events: EventSender,
    in_flight: Arc<InFlightSet>,
    workers: Mutex<JoinSet<()>>,
    runtime: Handle,
    next_id: AtomicU64,
    accepting: AtomicBool,
}

impl<C: Connector> CommandDispatcher<C> {
    /// Create a dispatcher on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(session: Arc<RemoteSession<C>>) -> (Self, DispatchEvents) {
        Self::with_runtime(session, Handle::current())
    }

    /// Create a dispatcher that spawns onto `runtime`.
    ///
    /// `submit` may then be called from threads outside the runtime.
    pub fn with_runtime(session: Arc<RemoteSession<C>>, runtime: Handle) -> (Self, DispatchEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            session,
            events,
            in_flight: Arc::new(InFlightSet::default()),
            workers: Mutex::new(JoinSet::new()),
            runtime,
            next_id: AtomicU64::new(1),
            accepting: AtomicBool::new(true),
        };
        (dispatcher, rx)
    }

    /// The shared session.
    pub fn session(&self) -> &Arc<RemoteSession<C>> {
        &self.session
    }

    /// Whether the session currently holds a transport.
    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    /// Submit a command for concurrent execution.
    ///
    /// Never waits on the network. Without a session the "Not connected"
    /// result is delivered before this returns.
    pub fn submit(&self, command: impl Into<String>) -> CommandHandle {
        let command = command.into();
        let id = RequestId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (reply, rx) = oneshot::channel();
        let handle = CommandHandle { id, rx };

        let mut ticket = Ticket {
            id,
            command: command.clone(),
            in_flight: self.in_flight.clone(),
            events: self.events.clone(),
            reply: Some(reply),
        };

        let mut workers = lock(&self.workers);

        if !self.accepting.load(Ordering::Acquire) {
            debug!(id = %id, "Rejecting command after shutdown");
            ticket.deliver(CommandResult::from_error(&crate::Error::Shutdown));
            return handle;
        }

        if !self.session.is_connected() {
            debug!(id = %id, command = %command, "Not connected, command not sent");
            ticket.deliver(CommandResult::not_connected());
            return handle;
        }

        while let Some(finished) = workers.try_join_next() {
            if let Err(e) = finished {
                warn!(error = %e, "Command task failed");
            }
        }

        self.in_flight.insert(CommandRequest::new(id, command.clone()));
        info!(id = %id, command = %command, "Sending command");

        let session = self.session.clone();
        let events = self.events.clone();
        workers.spawn_on(
            async move {
                ticket.start();
                let result = match session.execute(&command).await {
                    Ok(output) => CommandResult::from_output(&output),
                    Err(e) => {
                        warn!(id = %ticket.id, error = %e, "Command failed");
                        if e.is_connection() {
                            let _ = events.send(DispatchEvent::Status(ConnectionStatus::Failed(
                                e.to_string(),
                            )));
                        } else if !session.is_connected() {
                            // The transport broke mid-command; later submits stay local
                            // until the caller reconnects.
                            let _ = events
                                .send(DispatchEvent::Status(ConnectionStatus::Disconnected));
                        }
                        CommandResult::from_error(&e)
                    }
                };
                ticket.complete(result);
            },
            &self.runtime,
        );

        handle
    }

    /// Connect the session and report the outcome on the sink.
    pub async fn connect(&self) -> ConnectionStatus {
        run_connect(&self.session, &self.events).await
    }

    /// Connect on a background task.
    pub fn spawn_connect(&self) {
        let session = self.session.clone();
        let events = self.events.clone();
        let mut workers = lock(&self.workers);
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        workers.spawn_on(
            async move {
                run_connect(&session, &events).await;
            },
            &self.runtime,
        );
    }

    /// Close the session and report `Disconnected`.
    ///
    /// Waits for a command currently holding the session to finish.
    pub async fn disconnect(&self) {
        self.session.close().await;
        info!("Disconnected");
        let _ = self
            .events
            .send(DispatchEvent::Status(ConnectionStatus::Disconnected));
    }

    /// Outstanding requests, oldest first.
    pub fn in_flight(&self) -> Vec<InFlight> {
        self.in_flight.snapshot()
    }

    /// Number of outstanding requests.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    /// Stop accepting work, wait for outstanding commands, close the session.
    pub async fn shutdown(&self) {
        let mut workers = {
            let mut guard = lock(&self.workers);
            self.accepting.store(false, Ordering::Release);
            std::mem::take(&mut *guard)
        };

        debug!(outstanding = workers.len(), "Waiting for command tasks");
        while let Some(finished) = workers.join_next().await {
            if let Err(e) = finished {
                warn!(error = %e, "Command task failed");
            }
        }

        self.disconnect().await;
    }
}

async fn run_connect<C: Connector>(
    session: &RemoteSession<C>,
    events: &EventSender,
) -> ConnectionStatus {
    let _ = events.send(DispatchEvent::Status(ConnectionStatus::Connecting));
    info!(addr = %session.config().address(), "Connecting");

    let status = match session.connect().await {
        Ok(()) => ConnectionStatus::Connected,
        Err(e) => ConnectionStatus::Failed(e.to_string()),
    };

    let _ = events.send(DispatchEvent::Status(status.clone()));
    status
}

// =============================================================================
// Tests
// =============================================================================
