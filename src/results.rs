//! Result aggregation: ordered (LPS, score) pairs.

use serde::Serialize;
use tracing::debug;

use crate::error::{CaptureError, CaptureResult};
use crate::Lps;

/// One row of the exported table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ScoreRecord {
    /// Target the score belongs to.
    #[serde(rename = "LPS")]
    pub lps: Lps,
    /// Scorer output.
    #[serde(rename = "Score")]
    pub score: f64,
}

/// Finalized, read-only scores in acceptance order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pairs: Vec<(Lps, f64)>,
}

impl ResultSet {
    /// Pairs in the order the scores were accepted.
    pub fn pairs(&self) -> &[(Lps, f64)] {
        &self.pairs
    }

    /// Number of scored targets.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// True when every target was skipped.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Rows ready for a tabular writer.
    pub fn records(&self) -> impl Iterator<Item = ScoreRecord> + '_ {
        self.pairs
            .iter()
            .map(|&(lps, score)| ScoreRecord { lps, score })
    }
}

/// Append-only accumulator owned by a [`Sequencer`](crate::sequencer::Sequencer).
#[derive(Debug, Default)]
pub struct ResultAggregator {
    pairs: Vec<(Lps, f64)>,
}

impl ResultAggregator {
    /// Empty aggregator.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Appends a score.
    ///
    /// # Errors
    /// [`CaptureError::DuplicateTarget`] if `target` already has a score;
    /// nothing is appended.
    pub(crate) fn record(&mut self, target: Lps, score: f64) -> CaptureResult<()> {
        if self.pairs.iter().any(|&(lps, _)| lps == target) {
            return Err(CaptureError::DuplicateTarget(target));
        }
        self.pairs.push((target, score));
        debug!(target, score, count = self.pairs.len(), "result recorded");
        Ok(())
    }

    /// Number of recorded scores.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Scores recorded so far, in order.
    pub fn pairs(&self) -> &[(Lps, f64)] {
        &self.pairs
    }

    /// Read-only copy of the scores; the owning sequencer checks completion.
    pub(crate) fn freeze(&self) -> ResultSet {
        ResultSet {
            pairs: self.pairs.clone(),
        }
    }
}
