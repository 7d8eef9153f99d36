//! Thin terminal adapter between operator input and a [`CaptureSession`].
//!
//! Parsing and message formatting only; every rule about what may happen
//! when lives in the session and the sequencer.

use std::str::FromStr;

use thiserror::Error;

use crate::error::{CaptureError, ErrorKind};
use crate::export::{ExportBridge, ExportOutcome};
use crate::scorer::{ManualScorer, ScoreOutcome, Scorer};
use crate::sequencer::Resolution;
use crate::session::CaptureSession;
use crate::Lps;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum OperatorCommand {
    /// Freeze the live frame.
    Capture,
    /// Accept the candidate, optionally with a typed-in outcome.
    Accept(Option<ScoreOutcome>),
    /// Reject the candidate.
    Retake,
    /// Set LED power.
    Power(u8),
    /// Open the LED port.
    Connect(String),
    /// Close the LED port.
    Disconnect,
    /// Print state.
    Status,
    /// List commands.
    Help,
    /// Leave without exporting.
    Quit,
}

/// Input that is not a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseCommandError {
    /// Blank line.
    #[error("empty command")]
    Empty,
    /// Unknown verb.
    #[error("unknown command '{0}' (type 'help')")]
    Unknown(String),
    /// Known verb, bad argument.
    #[error("{0}")]
    BadArgument(String),
}

impl FromStr for OperatorCommand {
    type Err = ParseCommandError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().ok_or(ParseCommandError::Empty)?;
        let arg = words.next();
        if let Some(extra) = words.next() {
            return Err(ParseCommandError::BadArgument(format!(
                "unexpected argument '{extra}' after '{verb} {}'",
                arg.unwrap_or_default()
            )));
        }
        let command = match verb.to_ascii_lowercase().as_str() {
            "capture" | "c" => OperatorCommand::Capture,
            "accept" | "a" | "continue" => {
                let outcome = arg
                    .map(str::parse::<ScoreOutcome>)
                    .transpose()
                    .map_err(|e| ParseCommandError::BadArgument(e.to_string()))?;
                OperatorCommand::Accept(outcome)
            }
            "retake" | "r" => OperatorCommand::Retake,
            "power" | "p" => {
                let level = arg
                    .ok_or_else(|| ParseCommandError::BadArgument("usage: power <0-255>".into()))?
                    .parse::<u8>()
                    .map_err(|_| {
                        ParseCommandError::BadArgument("power level must be 0-255".into())
                    })?;
                OperatorCommand::Power(level)
            }
            "connect" => OperatorCommand::Connect(
                arg.ok_or_else(|| ParseCommandError::BadArgument("usage: connect <port>".into()))?
                    .to_string(),
            ),
            "disconnect" => OperatorCommand::Disconnect,
            "status" | "s" => OperatorCommand::Status,
            "help" | "h" | "?" => OperatorCommand::Help,
            "quit" | "q" | "exit" => OperatorCommand::Quit,
            other => return Err(ParseCommandError::Unknown(other.to_string())),
        };
        let takes_arg = matches!(
            command,
            OperatorCommand::Accept(_) | OperatorCommand::Power(_) | OperatorCommand::Connect(_)
        );
        match arg {
            Some(extra) if !takes_arg => Err(ParseCommandError::BadArgument(format!(
                "'{verb}' takes no argument, got '{extra}'"
            ))),
            _ => Ok(command),
        }
    }
}

/// What the shell should print, and whether to stop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text for the operator.
    pub message: String,
    /// The operator asked to leave.
    pub quit: bool,
}

impl Reply {
    fn say(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            quit: false,
        }
    }
}

/// Help text.
pub const HELP: &str = "commands: capture | accept [score|retake|skip] | retake | power <0-255> | \
connect <port> | disconnect | status | quit";

/// Formats an error for the operator, flagging integration bugs separately.
pub fn describe_error(err: &CaptureError) -> String {
    match err.kind() {
        ErrorKind::Protocol => format!("Not now: {err}"),
        ErrorKind::UserInput => format!("Error: {err}"),
        kind => format!("Error ({kind}): {err}"),
    }
}

/// Runs one command against the session.
///
/// `scorer` is the configured scoring program, if any. An outcome typed after
/// `accept` always wins over it; with neither, the operator is asked for one.
pub fn dispatch(
    session: &mut CaptureSession,
    scorer: Option<&mut dyn Scorer>,
    command: OperatorCommand,
) -> Reply {
    let result = match command {
        OperatorCommand::Capture => session.capture().map(|candidate| {
            format!(
                "Captured Image - LPS {}. Type 'accept' to continue or 'retake'.",
                candidate.target()
            )
        }),
        OperatorCommand::Accept(typed) => {
            let resolution = match (typed, scorer) {
                (Some(outcome), _) => session.accept(&mut ManualScorer::with_outcome(outcome)),
                (None, Some(scorer)) => session.accept(scorer),
                (None, None) => {
                    return Reply::say("No scorer configured: type 'accept <score>', 'accept retake' or 'accept skip'.")
                }
            };
            resolution.map(|resolution| describe_resolution(&resolution))
        }
        OperatorCommand::Retake => session
            .retake()
            .map(|_| "Please retake the image.".to_string()),
        OperatorCommand::Power(level) => session.set_power(level).map(|_| {
            if session.illumination().is_connected {
                format!("LED power {level}")
            } else {
                format!("LED power {level} (not connected, nothing sent)")
            }
        }),
        OperatorCommand::Connect(port) => session
            .connect(&port)
            .map(|_| format!("Connected to {port}")),
        OperatorCommand::Disconnect => {
            session.disconnect();
            Ok("LED disconnected".to_string())
        }
        OperatorCommand::Status => Ok(status(session)),
        OperatorCommand::Help => Ok(HELP.to_string()),
        OperatorCommand::Quit => {
            return Reply {
                message: "Quitting without export.".to_string(),
                quit: true,
            }
        }
    };

    match result {
        Ok(message) => Reply::say(message),
        Err(err) => Reply::say(describe_error(&err)),
    }
}

/// Recorded scores as a two-column table, in acceptance order.
pub fn render_results(pairs: &[(Lps, f64)]) -> String {
    let mut table = String::from("  LPS  Score");
    for (lps, score) in pairs {
        table.push_str(&format!("\n{lps:>5}  {score:.3}"));
    }
    table
}

/// Scores that were recorded but never exported, for printing before the
/// shell exits early. `None` when nothing was recorded.
pub fn unsaved_results(session: &CaptureSession) -> Option<String> {
    let pairs = session.results().pairs();
    (!pairs.is_empty()).then(|| format!("Unsaved results:\n{}", render_results(pairs)))
}

/// What the shell should print after an export, and whether another
/// destination should be offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportReport {
    /// Text for the operator. Always carries the scores unless they were saved.
    pub message: String,
    /// The exporter failed; the results are still held by the session.
    pub retry: bool,
}

/// Finishes `session` through `bridge`.
///
/// A failed export leaves the session untouched, so the caller can build a
/// new bridge and try again.
pub fn export_results(session: &mut CaptureSession, bridge: &mut ExportBridge) -> ExportReport {
    match session.finish(bridge) {
        Ok((results, ExportOutcome::Saved(path))) => ExportReport {
            message: format!(
                "Saved {} result(s) to {}\n{}",
                results.len(),
                path.display(),
                render_results(results.pairs())
            ),
            retry: false,
        },
        Ok((results, ExportOutcome::Cancelled)) => ExportReport {
            message: format!(
                "No file selected. Results were not saved.\n{}",
                render_results(results.pairs())
            ),
            retry: false,
        },
        Err(err) => ExportReport {
            message: format!(
                "{}\n{}",
                describe_error(&err),
                render_results(session.results().pairs())
            ),
            retry: matches!(err.kind(), ErrorKind::Collaborator),
        },
    }
}

fn describe_resolution(resolution: &Resolution) -> String {
    match resolution {
        Resolution::Recorded { target, score } => format!("LPS {target} Score: {score:.2}"),
        Resolution::Retake { target, by_scorer: true } => {
            format!("Scorer asked for a retake of LPS {target}.")
        }
        Resolution::Retake { .. } => "Please retake the image.".to_string(),
        Resolution::Skipped { target } => format!("LPS {target} skipped."),
    }
}

fn status(session: &CaptureSession) -> String {
    let led = session.illumination();
    let sequencer = session.sequencer();
    format!(
        "{} | state: {} | recorded {} | remaining {} | skipped {:?} | LED {} power {}",
        session.banner(),
        session.state(),
        session.results().len(),
        sequencer.remaining(),
        sequencer.skipped(),
        led.port.as_deref().unwrap_or("disconnected"),
        led.last_power_level,
    )
}
