//! Front ends over the command dispatcher.
//!
//! [`Console`] reads lines, turns them into commands and submits them without
//! waiting; a separate printer task reports results and connection changes as
//! they arrive. [`run_once`] is the non-interactive path used when a command
//! is given on the command line.

use std::io::Write;

use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info};

use rcmd_core::{
    CommandDispatcher, CommandResult, ConnectionStatus, Connector, DispatchEvent, DispatchEvents,
    RequestId, Result,
};

use crate::player::{ConsoleInput, HELP, parse_line};

/// What the console did with one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing to print now; any news arrives as an event.
    Quiet,
    /// Local output.
    Print(String),
    /// A command went to the dispatcher.
    Submitted { id: RequestId, command: String },
    /// Leave the console.
    Quit,
}

/// Line-oriented console bound to one dispatcher.
pub struct Console<C: Connector> {
    dispatcher: CommandDispatcher<C>,
}

impl<C: Connector> Console<C> {
    pub fn new(dispatcher: CommandDispatcher<C>) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<C> {
        &self.dispatcher
    }

    /// Act on one input line.
    ///
    /// Never waits for a command to finish. Only `disconnect` waits, for the
    /// command currently holding the session.
    pub async fn handle_line(&self, line: &str) -> Step {
        let input = match parse_line(line) {
            None => return Step::Quiet,
            Some(Ok(input)) => input,
            Some(Err(e)) => return Step::Print(format!("error: {}", e)),
        };

        match input {
            ConsoleInput::Connect => {
                self.dispatcher.spawn_connect();
                Step::Quiet
            }
            ConsoleInput::Disconnect => {
                self.dispatcher.disconnect().await;
                Step::Quiet
            }
            ConsoleInput::Status => Step::Print(self.status_line()),
            ConsoleInput::Help => Step::Print(HELP.to_string()),
            ConsoleInput::Quit => Step::Quit,
            ConsoleInput::Run(command) => self.submit(command),
            ConsoleInput::Player(player) => self.submit(player.to_command()),
        }
    }

    fn submit(&self, command: String) -> Step {
        let handle = self.dispatcher.submit(command.as_str());
        Step::Submitted {
            id: handle.id(),
            command,
        }
    }

    fn status_line(&self) -> String {
        let addr = self.dispatcher.session().config().address();
        let connection = if self.dispatcher.is_connected() {
            format!("connected to {}", addr)
        } else {
            format!("not connected ({})", addr)
        };
        format!(
            "{}, {} command(s) in flight",
            connection,
            self.dispatcher.in_flight_count()
        )
    }

    /// Connect, then read lines until `quit` or end of input.
    ///
    /// A failed initial connect leaves the console usable; `connect` retries.
    /// Outstanding commands are drained before returning.
    pub async fn run<R: AsyncBufRead + Unpin>(self, input: R) -> Result<()> {
        self.dispatcher.connect().await;

        let mut lines = input.lines();
        while let Some(line) = lines.next_line().await? {
            match self.handle_line(&line).await {
                Step::Quiet => {}
                Step::Print(text) => println!("{}", text),
                Step::Submitted { id, command } => println!("[{}] sending: {}", id, command),
                Step::Quit => break,
            }
        }

        info!("Console closing");
        self.dispatcher.shutdown().await;
        Ok(())
    }
}

/// Render one dispatcher event for the console.
pub fn format_event(event: &DispatchEvent) -> String {
    match event {
        DispatchEvent::Completed(outcome) => format!("[{}] {}", outcome.id, outcome.result),
        DispatchEvent::Status(status) => format!("-- {}", status),
    }
}

/// Print events until every sender is gone.
pub async fn print_events<W: Write>(mut events: DispatchEvents, mut out: W) {
    while let Some(event) = events.recv().await {
        if writeln!(out, "{}", format_event(&event)).is_err() {
            debug!("Output closed, dropping remaining events");
            break;
        }
        let _ = out.flush();
    }
}

/// Connect, run `command` once and shut down.
///
/// A failed connect is reported as the command's failure.
pub async fn run_once<C: Connector>(
    dispatcher: &CommandDispatcher<C>,
    command: &str,
) -> CommandResult {
    let result = match dispatcher.connect().await {
        ConnectionStatus::Failed(reason) => CommandResult::failure(reason),
        _ => dispatcher.submit(command).result().await,
    };
    dispatcher.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcmd_core::CommandOutcome;
    use rcmd_test_utils::{MockConnector, MockResponse, mock_session};

    fn console() -> (Console<MockConnector>, DispatchEvents, MockConnector) {
        let (session, connector) = mock_session();
        let (dispatcher, events) = CommandDispatcher::new(session);
        (Console::new(dispatcher), events, connector)
    }

    async fn next_outcome(events: &mut DispatchEvents) -> CommandOutcome {
        loop {
            match events.recv().await {
                Some(DispatchEvent::Completed(outcome)) => return outcome,
                Some(DispatchEvent::Status(_)) => {}
                None => panic!("event channel closed"),
            }
        }
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_dispatcher() {
        let (console, _events, connector) = console();
        console.dispatcher().connect().await;
        let calls = connector.total_calls();

        for line in ["load", "volume 150", "volume x", "bogus", "run"] {
            let step = console.handle_line(line).await;
            assert!(
                matches!(step, Step::Print(ref text) if text.starts_with("error: ")),
                "{:?} should be refused locally, got {:?}",
                line,
                step
            );
        }

        assert_eq!(connector.total_calls(), calls);
        assert_eq!(console.dispatcher().in_flight_count(), 0);
    }

    #[tokio::test]
    async fn player_verb_is_submitted() {
        let (console, mut events, connector) = console();
        console.dispatcher().connect().await;
        connector.respond("mpc volume 99", MockResponse::ok("volume: 99%"));

        let (id, command) = match console.handle_line("max").await {
            Step::Submitted { id, command } => (id, command),
            other => panic!("expected submission, got {:?}", other),
        };
        assert_eq!(command, "mpc volume 99");
        let outcome = next_outcome(&mut events).await;
        assert_eq!(outcome.id, id);
        assert_eq!(
            format_event(&DispatchEvent::Completed(outcome)),
            format!("[{}] OK: volume: 99%", id)
        );
    }

    #[tokio::test]
    async fn submit_while_disconnected_reports_not_connected() {
        let (console, mut events, connector) = console();

        assert!(matches!(
            console.handle_line("play").await,
            Step::Submitted { .. }
        ));

        let outcome = next_outcome(&mut events).await;
        assert_eq!(outcome.result.to_string(), "ERROR: Not connected");
        assert_eq!(connector.total_calls(), 0);
    }

    #[tokio::test]
    async fn status_reports_connection_and_in_flight() {
        let (console, _events, _connector) = console();

        assert_eq!(
            console.handle_line("status").await,
            Step::Print("not connected (mockhost:22), 0 command(s) in flight".to_string())
        );

        console.dispatcher().connect().await;
        assert_eq!(
            console.handle_line("status").await,
            Step::Print("connected to mockhost:22, 0 command(s) in flight".to_string())
        );
    }

    #[tokio::test]
    async fn connect_and_disconnect_verbs() {
        let (console, mut events, connector) = console();

        assert_eq!(console.handle_line("connect").await, Step::Quiet);
        let mut statuses = Vec::new();
        while statuses.len() < 2 {
            if let Some(DispatchEvent::Status(status)) = events.recv().await {
                statuses.push(status);
            }
        }
        assert_eq!(
            statuses,
            vec![ConnectionStatus::Connecting, ConnectionStatus::Connected]
        );

        assert_eq!(console.handle_line("disconnect").await, Step::Quiet);
        assert!(!console.dispatcher().is_connected());
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn quit_and_blank_lines() {
        let (console, _events, _connector) = console();
        assert_eq!(console.handle_line("quit").await, Step::Quit);
        assert_eq!(console.handle_line("   ").await, Step::Quiet);
        assert!(matches!(console.handle_line("help").await, Step::Print(_)));
    }

    #[tokio::test]
    async fn run_drains_commands_before_returning() {
        let (console, mut events, connector) = console();
        connector.set_default_delay(std::time::Duration::from_millis(5));

        console
            .run(&b"play\nvolume 40\n\nquit\nnext\n"[..])
            .await
            .unwrap();

        assert_eq!(connector.connect_count(), 1);
        assert_eq!(connector.exec_count(), 2);
        assert_eq!(connector.close_count(), 1);

        let mut completed = Vec::new();
        while let Some(event) = events.recv().await {
            if let DispatchEvent::Completed(outcome) = event {
                completed.push(outcome.command);
            }
        }
        completed.sort();
        assert_eq!(completed, vec!["mpc play", "mpc volume 40"]);
    }

    #[tokio::test]
    async fn printer_writes_each_event() {
        let (session, _connector) = mock_session();
        let (dispatcher, events) = CommandDispatcher::new(session);
        dispatcher.submit("mpc pause");
        drop(dispatcher);

        let mut out = Vec::new();
        print_events(events, &mut out).await;

        assert_eq!(String::from_utf8(out).unwrap(), "[#1] ERROR: Not connected\n");
    }

    #[test]
    fn status_events_are_prefixed() {
        assert_eq!(
            format_event(&DispatchEvent::Status(ConnectionStatus::Failed(
                "connection timed out after 5s".into()
            ))),
            "-- failed: connection timed out after 5s"
        );
    }

    #[tokio::test]
    async fn run_once_returns_command_result() {
        let (session, connector) = mock_session();
        connector.respond("mpc play", MockResponse::exit(1, "", "MPD not running"));
        let (dispatcher, _events) = CommandDispatcher::new(session);

        let result = run_once(&dispatcher, "mpc play").await;

        assert!(!result.succeeded);
        assert_eq!(result.message, "MPD not running");
        assert_eq!(connector.close_count(), 1);
    }

    #[tokio::test]
    async fn run_once_reports_connect_failure() {
        let (session, connector) = mock_session();
        connector.fail_next_connects(1);
        let (dispatcher, _events) = CommandDispatcher::new(session);

        let result = run_once(&dispatcher, "mpc play").await;

        assert!(!result.succeeded);
        assert_eq!(result.message, "authentication failed for mock");
        assert_eq!(connector.exec_count(), 0);
    }
}
