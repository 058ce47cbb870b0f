//! The subset of the rotctld text protocol spoken by Gpredict.
//!
//! Requests are single lines of space separated tokens. Both the short
//! (`P 180.00 45.00`) and the long (`\set_pos 180.00 45.00`) spellings are
//! accepted.

use antenna_controller::PositionReading;
use antenna_controller::position::format_degrees;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Command {
    /// `p`: report the current position.
    GetPosition,
    /// `P az el`: point the dish.
    SetPosition { azimuth: f64, elevation: f64 },
    /// `S`: halt the motors.
    Stop,
    /// `q`: close the connection.
    Quit,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("empty command")]
    Empty,

    #[error("unknown command {0:?}")]
    Unknown(String),

    #[error("{command} expects {expected} arguments, got {got}")]
    Arity {
        command: String,
        expected: usize,
        got: usize,
    },

    #[error("{0:?} is not a number")]
    InvalidNumber(String),
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, CommandError> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next().ok_or(CommandError::Empty)?;
        let args: Vec<&str> = tokens.collect();

        let command = match name {
            "p" | "\\get_pos" => Command::GetPosition,
            "P" | "\\set_pos" => {
                let [azimuth, elevation] = args[..] else {
                    return Err(CommandError::Arity {
                        command: name.to_string(),
                        expected: 2,
                        got: args.len(),
                    });
                };

                return Ok(Command::SetPosition {
                    azimuth: parse_degrees(azimuth)?,
                    elevation: parse_degrees(elevation)?,
                });
            }
            "S" | "\\stop" => Command::Stop,
            "q" | "Q" | "\\quit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        if !args.is_empty() {
            return Err(CommandError::Arity {
                command: name.to_string(),
                expected: 0,
                got: args.len(),
            });
        }

        Ok(command)
    }
}

/// Gpredict running under a locale with decimal commas sends `180,50`.
fn parse_degrees(token: &str) -> Result<f64, CommandError> {
    token
        .replace(',', ".")
        .parse()
        .map_err(|_| CommandError::InvalidNumber(token.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reply {
    Position(PositionReading),
    Ok,
    Failed,
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Position(position) => write!(
                f,
                "{}\n{}\n",
                format_degrees(position.azimuth()),
                format_degrees(position.elevation())
            ),
            Reply::Ok => writeln!(f, "RPRT 0"),
            Reply::Failed => writeln!(f, "RPRT 1"),
        }
    }
}
