//! Test doubles for the scorer and exporter collaborators.
//!
//! Hardware doubles (serial wire, cameras) live in [`crate::hardware::mock`].

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::export::{ExportOutcome, Exporter};
use crate::frame::CapturedFrame;
use crate::results::ResultSet;
use crate::scorer::{ScoreOutcome, Scorer};

/// Scorer that answers from a queue and remembers which captures it saw.
#[derive(Debug, Default)]
pub struct ScriptedScorer {
    outcomes: VecDeque<ScoreOutcome>,
    seen: Vec<u64>,
}

impl ScriptedScorer {
    /// Answers `outcomes` in order; errors once they run out.
    pub fn new(outcomes: impl IntoIterator<Item = ScoreOutcome>) -> Self {
        Self {
            outcomes: outcomes.into_iter().collect(),
            seen: Vec::new(),
        }
    }

    /// Number of frames scored.
    pub fn calls(&self) -> usize {
        self.seen.len()
    }

    /// Capture ids of the scored frames, in order.
    pub fn seen(&self) -> &[u64] {
        &self.seen
    }
}

impl Scorer for ScriptedScorer {
    fn score(&mut self, capture: &CapturedFrame) -> Result<ScoreOutcome> {
        self.seen.push(capture.capture_id());
        self.outcomes
            .pop_front()
            .ok_or_else(|| anyhow!("scripted scorer has no outcome for LPS {}", capture.target()))
    }
}

/// Shared view of what a [`RecordingExporter`] received.
#[derive(Debug, Clone, Default)]
pub struct ExportLog(Arc<Mutex<Vec<ResultSet>>>);

impl ExportLog {
    /// Result sets exported so far.
    pub fn exports(&self) -> Vec<ResultSet> {
        self.0
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[derive(Debug, Clone)]
enum Behaviour {
    Save,
    Cancel,
    Fail(String),
}

/// Exporter that keeps results in memory.
#[derive(Debug, Clone)]
pub struct RecordingExporter {
    log: ExportLog,
    behaviour: Behaviour,
}

impl RecordingExporter {
    /// Exporter that "saves" to `memory://results`.
    pub fn new() -> Self {
        Self {
            log: ExportLog::default(),
            behaviour: Behaviour::Save,
        }
    }

    /// Exporter that behaves like a dismissed save dialog.
    pub fn cancelling() -> Self {
        Self {
            behaviour: Behaviour::Cancel,
            ..Self::new()
        }
    }

    /// Exporter that fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            behaviour: Behaviour::Fail(message.to_string()),
            ..Self::new()
        }
    }

    /// Handle for inspecting exports after the exporter is moved.
    pub fn log(&self) -> ExportLog {
        self.log.clone()
    }
}

impl Default for RecordingExporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Exporter for RecordingExporter {
    fn export(&mut self, results: &ResultSet) -> Result<ExportOutcome> {
        match &self.behaviour {
            Behaviour::Save => {
                self.log
                    .0
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(results.clone());
                Ok(ExportOutcome::Saved(PathBuf::from("memory://results")))
            }
            Behaviour::Cancel => Ok(ExportOutcome::Cancelled),
            Behaviour::Fail(message) => Err(anyhow!("{message}")),
        }
    }
}
