//! rcmd binary entry point.
//!
//! Runs one command and exits, or opens an interactive console when no
//! command is given.

use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use rcmd_client::{Cli, Console, print_events, run_once};
use rcmd_core::{CommandDispatcher, ConnectionConfig, RemoteSession};

fn main() {
    let cli = Cli::parse();

    let log_format = cli.log_format.into();
    if let Err(e) = rcmd_core::init_logging(cli.verbose, cli.log_file.as_deref(), log_format) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    info!(version = env!("CARGO_PKG_VERSION"), "rcmd starting");

    let config = match cli.connection_config() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid connection settings");
            eprintln!("rcmd: {}", e);
            eprintln!("Usage: rcmd [user@]host[:port] [command]");
            std::process::exit(2);
        }
    };

    info!(
        addr = %config.address(),
        user = %config.effective_username(),
        "Using remote host"
    );

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("rcmd: failed to create tokio runtime: {}", e);
            std::process::exit(1);
        }
    };

    let code = rt.block_on(run(&cli, config));
    std::process::exit(code);
}

async fn run(cli: &Cli, config: ConnectionConfig) -> i32 {
    let session = match RemoteSession::ssh(config) {
        Ok(session) => Arc::new(session),
        Err(e) => {
            eprintln!("rcmd: {}", e);
            return 2;
        }
    };
    let (dispatcher, events) = CommandDispatcher::new(session);

    if let Some(command) = cli.command_string() {
        drop(events);
        let result = run_once(&dispatcher, &command).await;
        if result.succeeded {
            println!("{}", result.message);
            return 0;
        }
        error!(command = %command, message = %result.message, "Command failed");
        eprintln!("{}", result.message);
        return 1;
    }

    let printer = tokio::spawn(print_events(events, std::io::stdout()));
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let status = Console::new(dispatcher).run(stdin).await;
    let _ = printer.await;

    match status {
        Ok(()) => 0,
        Err(e) => {
            error!(error = %e, "Console failed");
            eprintln!("rcmd: {}", e);
            1
        }
    }
}
