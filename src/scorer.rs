//! Scorer collaborator interface.
//!
//! The image-quality metric itself lives outside this crate. A scorer looks at
//! an accepted [`CapturedFrame`] and answers with a number, or tells the
//! sequencer to retake or skip the target.

use std::fmt;
use std::process::Command;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use thiserror::Error;
use tracing::debug;

use crate::frame::CapturedFrame;

/// What the scorer decided about a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    /// Quality metric for the target.
    Numeric(f64),
    /// The frame is unusable; capture the same target again.
    Retake,
    /// Drop the target from the run.
    Skip,
}

impl fmt::Display for ScoreOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreOutcome::Numeric(score) => write!(f, "{score:.2}"),
            ScoreOutcome::Retake => f.write_str("retake"),
            ScoreOutcome::Skip => f.write_str("skip"),
        }
    }
}

/// Text that is neither `retake`, `skip` nor a finite number.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("expected a score, 'retake' or 'skip', got {0:?}")]
pub struct ParseScoreError(pub String);

impl FromStr for ScoreOutcome {
    type Err = ParseScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "retake" => Ok(ScoreOutcome::Retake),
            "skip" => Ok(ScoreOutcome::Skip),
            other => other
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(ScoreOutcome::Numeric)
                .ok_or_else(|| ParseScoreError(trimmed.to_string())),
        }
    }
}

/// Scores accepted frames.
pub trait Scorer {
    /// Runs the metric on `capture`. Blocks until the outcome is known.
    fn score(&mut self, capture: &CapturedFrame) -> Result<ScoreOutcome>;
}

impl<F> Scorer for F
where
    F: FnMut(&CapturedFrame) -> Result<ScoreOutcome>,
{
    fn score(&mut self, capture: &CapturedFrame) -> Result<ScoreOutcome> {
        self(capture)
    }
}

/// Runs an external scoring program on the saved image.
///
/// The program is invoked as `<program> <args..> <image path>` and must print
/// a score, `retake` or `skip` as the last non-empty line of stdout.
///
/// [`Scorer::score`] blocks the calling thread until the program exits. Async
/// callers should run it through `tokio::task::block_in_place` or
/// `spawn_blocking`; the live feed is not polled while it runs.
#[derive(Debug, Clone)]
pub struct CommandScorer {
    program: String,
    args: Vec<String>,
}

impl CommandScorer {
    /// Scorer for `program` with extra leading arguments.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Splits a shell-style command line on whitespace.
    pub fn from_command_line(line: &str) -> Result<Self> {
        let mut parts = line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| anyhow!("scorer command is empty"))?;
        Ok(Self::new(program, parts.collect()))
    }
}

impl Scorer for CommandScorer {
    fn score(&mut self, capture: &CapturedFrame) -> Result<ScoreOutcome> {
        let path = capture.path().ok_or_else(|| {
            anyhow!(
                "frame for LPS {} was not saved; '{}' needs an image path",
                capture.target(),
                self.program
            )
        })?;

        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(path)
            .output()
            .with_context(|| format!("Failed to run scorer '{}'", self.program))?;

        if !output.status.success() {
            bail!(
                "scorer '{}' exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| anyhow!("scorer '{}' printed nothing", self.program))?;
        let outcome = last.parse::<ScoreOutcome>()?;
        debug!(target = capture.target(), %outcome, "external scorer finished");
        Ok(outcome)
    }
}

/// Outcome typed in by the operator.
///
/// Used when no scoring program is configured: the operator reads the metric
/// off their own tool and enters it along with the accept command.
#[derive(Debug, Default)]
pub struct ManualScorer {
    pending: Option<ScoreOutcome>,
}

impl ManualScorer {
    /// Scorer with nothing entered yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Scorer that answers `outcome` on the next call.
    pub fn with_outcome(outcome: ScoreOutcome) -> Self {
        Self {
            pending: Some(outcome),
        }
    }

    /// Queues the answer for the next call.
    pub fn set(&mut self, outcome: ScoreOutcome) {
        self.pending = Some(outcome);
    }
}

impl Scorer for ManualScorer {
    fn score(&mut self, capture: &CapturedFrame) -> Result<ScoreOutcome> {
        self.pending
            .take()
            .ok_or_else(|| anyhow!("no score entered for LPS {}", capture.target()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Frame;

    fn capture() -> CapturedFrame {
        CapturedFrame::new(1, 23, Frame::new(1, 1, vec![0]).unwrap())
    }

    #[test]
    fn test_parse_outcomes() {
        assert_eq!("retake".parse(), Ok(ScoreOutcome::Retake));
        assert_eq!(" SKIP\n".parse(), Ok(ScoreOutcome::Skip));
        assert_eq!("0.75".parse(), Ok(ScoreOutcome::Numeric(0.75)));
        assert_eq!(
            "NaN".parse::<ScoreOutcome>(),
            Err(ParseScoreError("NaN".into()))
        );
        assert!("blurry".parse::<ScoreOutcome>().is_err());
    }

    #[test]
    fn test_manual_scorer_is_single_use() {
        let mut scorer = ManualScorer::with_outcome(ScoreOutcome::Numeric(1.5));
        assert_eq!(scorer.score(&capture()).unwrap(), ScoreOutcome::Numeric(1.5));
        assert!(scorer.score(&capture()).is_err());
    }

    #[test]
    fn test_command_scorer_requires_saved_frame() {
        let mut scorer = CommandScorer::from_command_line("score_photo --interactive").unwrap();
        let err = scorer.score(&capture()).unwrap_err();
        assert!(err.to_string().contains("was not saved"));
    }

    #[test]
    fn test_empty_command_line_rejected() {
        assert!(CommandScorer::from_command_line("   ").is_err());
    }

    #[cfg(unix)]
    #[test]
    fn test_command_scorer_parses_last_line() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("23_image.png");
        std::fs::write(&image, b"png").unwrap();
        let mut scorer = CommandScorer::new(
            "sh",
            vec!["-c".into(), "echo analysing $0; echo 1.25".into()],
        );
        let outcome = scorer.score(&capture().with_path(image)).unwrap();
        assert_eq!(outcome, ScoreOutcome::Numeric(1.25));
    }

    #[cfg(unix)]
    #[test]
    fn test_command_scorer_waits_for_exit() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("40_image.png");
        std::fs::write(&image, b"png").unwrap();
        let mut scorer =
            CommandScorer::new("sh", vec!["-c".into(), "sleep 0.2; echo skip".into()]);
        let started = std::time::Instant::now();
        let outcome = scorer.score(&capture().with_path(image)).unwrap();
        assert!(started.elapsed() >= std::time::Duration::from_millis(200));
        assert_eq!(outcome, ScoreOutcome::Skip);
    }
}
