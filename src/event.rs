//! Control-plane events and the line-oriented command protocol: token
//! split, case-insensitive command + alias matching, `\r`/`\n`
//! stripping.

use thiserror::Error;

/// A client's originating connection, identified opaquely so the
/// supervisor can route a reply without depending on `net`'s socket type.
pub type ClientId = u64;

/// A parsed control-plane event, tagged with the client it came from so
/// the supervisor can reply to the right connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Activate { client: ClientId, task_name: String },
    Deactivate { client: ClientId, instance_id: u64 },
    List { client: ClientId },
    Info { client: ClientId },
    Shutdown { client: ClientId },
}

impl Event {
    pub fn client(&self) -> ClientId {
        match self {
            Event::Activate { client, .. }
            | Event::Deactivate { client, .. }
            | Event::List { client }
            | Event::Info { client }
            | Event::Shutdown { client } => *client,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command")]
    UnknownCommand,
    #[error("missing argument")]
    MissingArgument,
    #[error("invalid id format")]
    InvalidId,
}

/// Parses one line of the command protocol. `\r` is tolerated (and
/// stripped before this function is ever called by `net`, which strips
/// both `\r` and `\n`); command tokens are matched case-insensitively,
/// with each command's single-letter alias also accepted.
pub fn parse_line(client: ClientId, line: &str) -> Result<Event, ParseError> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut tokens = line.split_whitespace();

    let cmd = tokens.next().ok_or(ParseError::Empty)?;

    match cmd.to_ascii_uppercase().as_str() {
        "ACTIVATE" | "A" => {
            let task_name = tokens.next().ok_or(ParseError::MissingArgument)?;
            Ok(Event::Activate {
                client,
                task_name: task_name.to_owned(),
            })
        }
        "DEACTIVATE" | "D" => {
            let raw_id = tokens.next().ok_or(ParseError::MissingArgument)?;
            let instance_id: u64 = raw_id.parse().map_err(|_| ParseError::InvalidId)?;
            Ok(Event::Deactivate {
                client,
                instance_id,
            })
        }
        "LIST" | "L" => Ok(Event::List { client }),
        "INFO" | "I" => Ok(Event::Info { client }),
        "SHUTDOWN" | "S" => Ok(Event::Shutdown { client }),
        _ => Err(ParseError::UnknownCommand),
    }
}
