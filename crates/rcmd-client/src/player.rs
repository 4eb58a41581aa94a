//! Console input parsing.
//!
//! A console line is either a session verb (connect, status, ...) or a
//! player verb that maps onto one `mpc` invocation. Input errors are caught
//! here, before anything reaches the dispatcher.

use std::fmt;

use thiserror::Error;

/// Highest volume `mpc volume` is driven to.
pub const MAX_VOLUME: u8 = 99;

/// Music player action, sent to the remote host as an `mpc` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerCommand {
    Play,
    Pause,
    Toggle,
    Prev,
    Next,
    Random,
    /// Replace the queue with a playlist or file.
    Load(String),
    /// Set the volume (0..=99).
    Volume(u8),
}

impl PlayerCommand {
    /// The remote command line.
    pub fn to_command(&self) -> String {
        match self {
            PlayerCommand::Play => "mpc play".to_string(),
            PlayerCommand::Pause => "mpc pause".to_string(),
            PlayerCommand::Toggle => "mpc toggle".to_string(),
            PlayerCommand::Prev => "mpc prev".to_string(),
            PlayerCommand::Next => "mpc next".to_string(),
            PlayerCommand::Random => "mpc random".to_string(),
            PlayerCommand::Load(playlist) => format!("mpc load {}", playlist),
            PlayerCommand::Volume(level) => format!("mpc volume {}", level),
        }
    }
}

impl fmt::Display for PlayerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_command())
    }
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    Connect,
    Disconnect,
    Status,
    Help,
    Quit,
    /// Send an arbitrary command line.
    Run(String),
    Player(PlayerCommand),
}

/// Why a console line was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("unknown command: {0} (try 'help')")]
    Unknown(String),

    #[error("specify a playlist or file to load")]
    MissingPlaylist,

    #[error("specify a command to run")]
    MissingCommand,

    #[error("specify a volume between 0 and {max}")]
    MissingVolume { max: u8 },

    #[error("volume must be a number between 0 and {max}, got {value}")]
    InvalidVolume { value: String, max: u8 },

    #[error("'{verb}' takes no arguments")]
    UnexpectedArgument { verb: String },
}

/// Console help text.
pub const HELP: &str = "\
commands:
  connect | disconnect | status | help | quit
  play | pause | toggle | prev | next | random
  load <playlist>     volume <0-99>     mute | max
  run <command line>";

/// Parse one console line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Option<Result<ConsoleInput, InputError>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };

    Some(parse_verb(&verb.to_ascii_lowercase(), rest))
}

fn parse_verb(verb: &str, rest: &str) -> Result<ConsoleInput, InputError> {
    let input = match verb {
        "load" => {
            if rest.is_empty() {
                return Err(InputError::MissingPlaylist);
            }
            return Ok(ConsoleInput::Player(PlayerCommand::Load(rest.to_string())));
        }
        "volume" | "vol" => return parse_volume(rest).map(ConsoleInput::Player),
        "run" => {
            if rest.is_empty() {
                return Err(InputError::MissingCommand);
            }
            return Ok(ConsoleInput::Run(rest.to_string()));
        }
        "connect" => ConsoleInput::Connect,
        "disconnect" => ConsoleInput::Disconnect,
        "status" => ConsoleInput::Status,
        "help" | "?" => ConsoleInput::Help,
        "quit" | "exit" => ConsoleInput::Quit,
        "play" => ConsoleInput::Player(PlayerCommand::Play),
        "pause" => ConsoleInput::Player(PlayerCommand::Pause),
        "toggle" => ConsoleInput::Player(PlayerCommand::Toggle),
        "prev" => ConsoleInput::Player(PlayerCommand::Prev),
        "next" => ConsoleInput::Player(PlayerCommand::Next),
        "random" => ConsoleInput::Player(PlayerCommand::Random),
        "mute" => ConsoleInput::Player(PlayerCommand::Volume(0)),
        "max" => ConsoleInput::Player(PlayerCommand::Volume(MAX_VOLUME)),
        other => return Err(InputError::Unknown(other.to_string())),
    };

    if !rest.is_empty() {
        return Err(InputError::UnexpectedArgument {
            verb: verb.to_string(),
        });
    }
    Ok(input)
}

fn parse_volume(arg: &str) -> Result<PlayerCommand, InputError> {
    if arg.is_empty() {
        return Err(InputError::MissingVolume { max: MAX_VOLUME });
    }
    match arg.parse::<u8>() {
        Ok(level) if level <= MAX_VOLUME => Ok(PlayerCommand::Volume(level)),
        _ => Err(InputError::InvalidVolume {
            value: arg.to_string(),
            max: MAX_VOLUME,
        }),
    }
}
