//! Line-oriented presentation front end.
//!
//! Reads commands from stdin and prints every session outcome to stdout as
//! one JSON object per line. Logs go to stderr.

use std::str::FromStr;

use anyhow::Context;
use rollcall_core::{AttendanceMode, SessionMode, StudentNumber};
use rollcall_session::{Outcome, SessionError, SessionHandle};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

const HELP: &str = "\
commands:
  checkin | auth | enroll | lookup | idle   enter a mode
  cancel                                    drop the pending window
  confirm <in|out|rest> <student>           commit a check-in with this mode
  assign                                    register the last unknown card
  cancel-assign                             decline the registration offer
  help                                      show this text
  quit                                      leave";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Enter(SessionMode),
    Cancel,
    Confirm {
        mode: AttendanceMode,
        student_number: StudentNumber,
    },
    Assign,
    CancelAssign,
    Help,
    Quit,
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("Unknown command '{0}', type 'help'")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error(transparent)]
    Invalid(#[from] rollcall_core::Error),
}

impl FromStr for ConsoleCommand {
    type Err = ConsoleError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ConsoleError::Unknown(String::new()));
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "cancel" => ConsoleCommand::Cancel,
            "assign" => ConsoleCommand::Assign,
            "cancel-assign" => ConsoleCommand::CancelAssign,
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            "confirm" => {
                let usage = ConsoleError::Usage("confirm <in|out|rest> <student>");
                let (Some(mode), Some(student)) = (words.next(), words.next()) else {
                    return Err(usage);
                };
                ConsoleCommand::Confirm {
                    mode: mode.parse()?,
                    student_number: StudentNumber::new(student)?,
                }
            }
            other => match other.parse::<SessionMode>() {
                Ok(mode) => ConsoleCommand::Enter(mode),
                Err(_) => return Err(ConsoleError::Unknown(other.to_string())),
            },
        };

        if words.next().is_some() {
            return Err(ConsoleError::Unknown(line.trim().to_string()));
        }
        Ok(command)
    }
}

impl ConsoleCommand {
    async fn apply(self, handle: &SessionHandle) -> Result<(), SessionError> {
        match self {
            ConsoleCommand::Enter(mode) => handle.enter_mode(mode).await,
            ConsoleCommand::Cancel => handle.cancel().await,
            ConsoleCommand::Confirm {
                mode,
                student_number,
            } => handle.confirm_transition(mode, student_number).await,
            ConsoleCommand::Assign => handle.assign_new_user().await,
            ConsoleCommand::CancelAssign => handle.cancel_assign().await,
            ConsoleCommand::Help | ConsoleCommand::Quit => Ok(()),
        }
    }
}

/// Serialise an outcome as one JSON line.
pub fn render(outcome: &Outcome) -> serde_json::Result<String> {
    serde_json::to_string(outcome)
}

/// Drive the session from stdin until EOF, `quit` or Ctrl-C.
///
/// Consumes the handle so the session stops once the console returns.
pub async fn run(handle: SessionHandle) -> anyhow::Result<()> {
    let mut outcomes = handle.subscribe();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    eprintln!("{HELP}");

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    info!("Console input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }

                match line.parse::<ConsoleCommand>() {
                    Ok(ConsoleCommand::Quit) => break,
                    Ok(ConsoleCommand::Help) => eprintln!("{HELP}"),
                    Ok(command) => command
                        .apply(&handle)
                        .await
                        .context("Session stopped unexpectedly")?,
                    Err(e) => eprintln!("{e}"),
                }
            }
            outcome = outcomes.recv() => match outcome {
                Ok(outcome) => println!("{}", render(&outcome)?),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Console fell behind, outcomes dropped");
                }
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::ConnectionStatus;
    use rollcall_session::{Failure, FailureKind};
    use rstest::rstest;

    #[rstest]
    #[case("checkin", SessionMode::CheckIn)]
    #[case("auth", SessionMode::Authenticate)]
    #[case("enroll", SessionMode::Enroll)]
    #[case("lookup", SessionMode::LogLookup)]
    #[case("  IDLE ", SessionMode::Idle)]
    fn test_parse_modes(#[case] line: &str, #[case] mode: SessionMode) {
        assert_eq!(line.parse::<ConsoleCommand>().unwrap(), ConsoleCommand::Enter(mode));
    }

    #[rstest]
    #[case("cancel", ConsoleCommand::Cancel)]
    #[case("assign", ConsoleCommand::Assign)]
    #[case("cancel-assign", ConsoleCommand::CancelAssign)]
    #[case("help", ConsoleCommand::Help)]
    #[case("quit", ConsoleCommand::Quit)]
    fn test_parse_plain_commands(#[case] line: &str, #[case] expected: ConsoleCommand) {
        assert_eq!(line.parse::<ConsoleCommand>().unwrap(), expected);
    }

    #[test]
    fn test_parse_confirm() {
        assert_eq!(
            "confirm rest S001".parse::<ConsoleCommand>().unwrap(),
            ConsoleCommand::Confirm {
                mode: AttendanceMode::Rest,
                student_number: StudentNumber::new("S001").unwrap(),
            }
        );
    }

    #[rstest]
    #[case("confirm")]
    #[case("confirm in")]
    fn test_parse_confirm_usage(#[case] line: &str) {
        assert!(matches!(
            line.parse::<ConsoleCommand>(),
            Err(ConsoleError::Usage(_))
        ));
    }

    #[test]
    fn test_parse_confirm_bad_mode() {
        assert!(matches!(
            "confirm sideways S001".parse::<ConsoleCommand>(),
            Err(ConsoleError::Invalid(_))
        ));
    }

    #[rstest]
    #[case("dance")]
    #[case("cancel now")]
    fn test_parse_unknown(#[case] line: &str) {
        assert!(matches!(
            line.parse::<ConsoleCommand>(),
            Err(ConsoleError::Unknown(_))
        ));
    }

    #[test]
    fn test_render_outcomes() {
        let status = render(&Outcome::ConnectionStatus(ConnectionStatus::Active)).unwrap();
        assert_eq!(status, r#"{"event":"connection-status","payload":"active"}"#);

        let failure = render(&Outcome::Auth(Err(Failure::new(
            FailureKind::Timeout,
            "No registered card was presented in time",
        ))))
        .unwrap();
        let value: serde_json::Value = serde_json::from_str(&failure).unwrap();
        assert_eq!(value["event"], "auth-result");
        assert_eq!(value["payload"]["Err"]["kind"], "timeout");
    }
}
