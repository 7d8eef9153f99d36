//! Capture sequencer: the state machine behind the calibration run.
//!
//! The sequencer walks an ordered list of LPS targets. For each target the
//! operator captures a candidate frame, then accepts or retakes it. An accepted
//! frame goes to the [`Scorer`], whose outcome decides what happens next:
//!
//! ```text
//!            capture              decide(Accept)
//! AwaitingCapture ──► AwaitingDecision ──────────► Scoring
//!      ▲    ▲               │                        │
//!      │    └── Retake ─────┘                        │
//!      │                                             │
//!      ├──── Numeric: record, cursor + 1 ────────────┤
//!      ├──── Retake:  same cursor ───────────────────┤
//!      └──── Skip:    remove target, same cursor ────┘
//!
//! cursor == targets.len()  ⇒  Complete
//! ```
//!
//! Every method takes `&mut self`, so two callers can never interleave
//! transitions. The explicit `Scoring` state additionally rejects capture and
//! decide calls while an asynchronous scorer is still working on a frame taken
//! out with [`Sequencer::accept`].

use std::fmt;

use tracing::{debug, info, warn};

use crate::error::{CaptureError, CaptureResult};
use crate::frame::{CapturedFrame, Frame};
use crate::results::{ResultAggregator, ResultSet};
use crate::scorer::{ScoreOutcome, Scorer};
use crate::Lps;

/// Ordered, duplicate-free list of LPS targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetList(Vec<Lps>);

impl TargetList {
    /// Validates and wraps the operator's selection, keeping its order.
    ///
    /// # Errors
    /// [`CaptureError::EmptyTargetList`] for an empty selection,
    /// [`CaptureError::InvalidTarget`] for a zero LPS and
    /// [`CaptureError::DuplicateTarget`] for a repeated one.
    pub fn new(targets: Vec<Lps>) -> CaptureResult<Self> {
        if targets.is_empty() {
            return Err(CaptureError::EmptyTargetList);
        }
        for (idx, &lps) in targets.iter().enumerate() {
            if lps == 0 {
                return Err(CaptureError::InvalidTarget(lps));
            }
            if targets[..idx].contains(&lps) {
                return Err(CaptureError::DuplicateTarget(lps));
            }
        }
        Ok(Self(targets))
    }

    /// Number of targets still in the list.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether every target has been removed.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Target at `index`.
    pub fn get(&self, index: usize) -> Option<Lps> {
        self.0.get(index).copied()
    }

    /// Targets in sequencing order.
    pub fn as_slice(&self) -> &[Lps] {
        &self.0
    }

    fn remove_at(&mut self, index: usize) -> Lps {
        // Vec::remove shifts the tail left, preserving relative order.
        self.0.remove(index)
    }
}

/// Operator decision on a candidate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Send the candidate to the scorer.
    Accept,
    /// Throw the candidate away and capture again.
    Retake,
}

/// What a finished decision did to the sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Resolution {
    /// The score was recorded and the cursor moved on.
    Recorded {
        /// Target that was scored.
        target: Lps,
        /// Score handed to the aggregator.
        score: f64,
    },
    /// The candidate was discarded; the same target must be captured again.
    Retake {
        /// Target still being solicited.
        target: Lps,
        /// True when the scorer, not the operator, asked for the retake.
        by_scorer: bool,
    },
    /// The target was removed from the list.
    Skipped {
        /// Target that was dropped.
        target: Lps,
    },
}

/// Read-only view of the sequencer's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Waiting for the operator to capture a frame for `target`.
    AwaitingCapture {
        /// Index of `target` in the list.
        cursor: usize,
        /// Target being solicited.
        target: Lps,
    },
    /// A candidate for `target` is frozen and waiting for accept/retake.
    AwaitingDecision {
        /// Index of `target` in the list.
        cursor: usize,
        /// Target the candidate belongs to.
        target: Lps,
        /// Id of the frozen candidate.
        capture_id: u64,
    },
    /// The candidate for `target` is with the scorer.
    Scoring {
        /// Index of `target` in the list.
        cursor: usize,
        /// Target being scored.
        target: Lps,
    },
    /// Every target has been scored or skipped.
    Complete,
}

impl fmt::Display for SequencerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequencerState::AwaitingCapture { target, .. } => {
                write!(f, "awaiting capture for LPS {target}")
            }
            SequencerState::AwaitingDecision { target, .. } => {
                write!(f, "awaiting decision for LPS {target}")
            }
            SequencerState::Scoring { target, .. } => write!(f, "scoring LPS {target}"),
            SequencerState::Complete => f.write_str("complete"),
        }
    }
}

#[derive(Debug)]
enum Phase {
    AwaitingCapture,
    AwaitingDecision(CapturedFrame),
    Scoring(Lps),
}

/// The capture state machine.
#[derive(Debug)]
pub struct Sequencer {
    targets: TargetList,
    cursor: usize,
    phase: Phase,
    initial_len: usize,
    skipped: Vec<Lps>,
    next_capture_id: u64,
    results: ResultAggregator,
}

impl Sequencer {
    /// Starts a sequence at the first target.
    ///
    /// # Errors
    /// Fails with [`CaptureError::EmptyTargetList`] (or another validation error
    /// from [`TargetList::new`]) without constructing any state.
    pub fn begin(targets: Vec<Lps>) -> CaptureResult<Self> {
        let targets = TargetList::new(targets)?;
        info!(targets = ?targets.as_slice(), "capture sequence started");
        Ok(Self {
            initial_len: targets.len(),
            targets,
            cursor: 0,
            phase: Phase::AwaitingCapture,
            skipped: Vec::new(),
            next_capture_id: 1,
            results: ResultAggregator::new(),
        })
    }

    /// Current state.
    pub fn state(&self) -> SequencerState {
        let Some(target) = self.targets.get(self.cursor) else {
            return SequencerState::Complete;
        };
        let cursor = self.cursor;
        match &self.phase {
            Phase::AwaitingCapture => SequencerState::AwaitingCapture { cursor, target },
            Phase::AwaitingDecision(candidate) => SequencerState::AwaitingDecision {
                cursor,
                target,
                capture_id: candidate.capture_id(),
            },
            Phase::Scoring(_) => SequencerState::Scoring { cursor, target },
        }
    }

    /// True once the cursor has run off the end of the list.
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.targets.len()
    }

    /// The LPS value being solicited.
    ///
    /// # Errors
    /// [`CaptureError::SequenceComplete`] once every target is resolved.
    pub fn current_target(&self) -> CaptureResult<Lps> {
        self.targets
            .get(self.cursor)
            .ok_or(CaptureError::SequenceComplete)
    }

    /// 1-based position of the current target and the list length, for the
    /// "(i/n)" part of the instruction banner. `None` when complete.
    pub fn progress(&self) -> Option<(usize, usize)> {
        (!self.is_complete()).then(|| (self.cursor + 1, self.targets.len()))
    }

    /// Index of the current target.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Targets still in the list (scored ones included, skipped ones removed).
    pub fn targets(&self) -> &TargetList {
        &self.targets
    }

    /// Targets not yet scored or skipped.
    pub fn remaining(&self) -> usize {
        self.targets.len() - self.cursor
    }

    /// Targets removed by scorer skips, in the order they were skipped.
    pub fn skipped(&self) -> &[Lps] {
        &self.skipped
    }

    /// Size of the original selection.
    pub fn initial_len(&self) -> usize {
        self.initial_len
    }

    /// Scores recorded by this sequence so far.
    pub fn results(&self) -> &ResultAggregator {
        &self.results
    }

    /// Freezes the recorded scores once every target is scored or skipped.
    ///
    /// # Errors
    /// [`CaptureError::SequenceNotComplete`] while targets remain.
    pub fn finalize(&self) -> CaptureResult<ResultSet> {
        if !self.is_complete() {
            return Err(CaptureError::SequenceNotComplete {
                remaining: self.remaining(),
            });
        }
        Ok(self.results.freeze())
    }

    /// The frozen candidate, while one is waiting for a decision.
    pub fn candidate(&self) -> Option<&CapturedFrame> {
        match &self.phase {
            Phase::AwaitingDecision(candidate) => Some(candidate),
            _ => None,
        }
    }

    /// Freezes `snapshot` as the candidate for the current target.
    ///
    /// # Errors
    /// [`CaptureError::NoFrameAvailable`] if there is no (or an empty) frame,
    /// [`CaptureError::InvalidState`] outside `AwaitingCapture`.
    pub fn capture(&mut self, snapshot: Option<Frame>) -> CaptureResult<&CapturedFrame> {
        self.require_awaiting_capture("capture")?;
        let frame = snapshot
            .filter(|frame| !frame.is_empty())
            .ok_or(CaptureError::NoFrameAvailable)?;
        let target = self.current_target()?;
        let candidate = CapturedFrame::new(self.next_capture_id, target, frame);
        self.next_capture_id += 1;
        debug!(
            target,
            capture_id = candidate.capture_id(),
            "candidate frame captured"
        );
        self.phase = Phase::AwaitingDecision(candidate);
        let Phase::AwaitingDecision(candidate) = &self.phase else {
            return Err(self.invalid("capture"));
        };
        Ok(candidate)
    }

    /// Applies the operator's decision.
    ///
    /// `Retake` discards the candidate. `Accept` runs `scorer` synchronously and
    /// routes its outcome through [`resolve`](Self::resolve). A scorer error
    /// drops the candidate, returns to `AwaitingCapture` on the same target and
    /// is passed back as [`CaptureError::Scorer`].
    pub fn decide(
        &mut self,
        decision: Decision,
        scorer: &mut dyn Scorer,
    ) -> CaptureResult<Resolution> {
        match decision {
            Decision::Retake => self.retake(),
            Decision::Accept => {
                let candidate = self.accept()?;
                match scorer.score(&candidate) {
                    Ok(outcome) => self.resolve(outcome),
                    Err(err) => {
                        self.abandon_scoring()?;
                        Err(CaptureError::Scorer(err))
                    }
                }
            }
        }
    }

    /// Operator-level retake: drop the candidate, stay on the same target.
    pub fn retake(&mut self) -> CaptureResult<Resolution> {
        self.require_awaiting_decision("retake")?;
        let target = self.current_target()?;
        self.phase = Phase::AwaitingCapture;
        info!(target, "operator requested retake");
        Ok(Resolution::Retake {
            target,
            by_scorer: false,
        })
    }

    /// First half of an accept: moves to `Scoring` and hands the candidate out.
    ///
    /// Until [`resolve`](Self::resolve) or [`abandon_scoring`](Self::abandon_scoring)
    /// is called, capture and decide calls are rejected.
    pub fn accept(&mut self) -> CaptureResult<CapturedFrame> {
        self.require_awaiting_decision("accept")?;
        let target = self.current_target()?;
        let previous = std::mem::replace(&mut self.phase, Phase::Scoring(target));
        match previous {
            Phase::AwaitingDecision(candidate) => {
                info!(target, capture_id = candidate.capture_id(), "candidate accepted");
                Ok(candidate)
            }
            other => {
                self.phase = other;
                Err(self.invalid("accept"))
            }
        }
    }

    /// Second half of an accept: applies the scorer's outcome.
    ///
    /// # Errors
    /// [`CaptureError::InvalidState`] outside `Scoring`. A score the aggregator
    /// refuses is returned as is and leaves the sequencer in `Scoring`.
    pub fn resolve(&mut self, outcome: ScoreOutcome) -> CaptureResult<Resolution> {
        let target = match self.phase {
            Phase::Scoring(target) => target,
            _ => return Err(self.invalid("resolve a score")),
        };

        let resolution = match outcome {
            ScoreOutcome::Numeric(score) => {
                self.results.record(target, score)?;
                self.cursor += 1;
                info!(target, score, "score recorded");
                Resolution::Recorded { target, score }
            }
            ScoreOutcome::Retake => {
                warn!(target, "scorer requested retake");
                Resolution::Retake {
                    target,
                    by_scorer: true,
                }
            }
            ScoreOutcome::Skip => {
                let removed = self.targets.remove_at(self.cursor);
                self.skipped.push(removed);
                warn!(target = removed, remaining = self.remaining(), "target skipped");
                Resolution::Skipped { target: removed }
            }
        };

        self.phase = Phase::AwaitingCapture;
        if self.is_complete() {
            info!(
                recorded = self.results.len(),
                skipped = self.skipped.len(),
                "all LPS processed"
            );
        }
        Ok(resolution)
    }

    /// Leaves `Scoring` without an outcome (e.g. the scorer failed).
    pub fn abandon_scoring(&mut self) -> CaptureResult<()> {
        match self.phase {
            Phase::Scoring(target) => {
                warn!(target, "scoring abandoned; recapture required");
                self.phase = Phase::AwaitingCapture;
                Ok(())
            }
            _ => Err(self.invalid("abandon scoring")),
        }
    }

    fn require_awaiting_capture(&self, operation: &'static str) -> CaptureResult<()> {
        match self.state() {
            SequencerState::AwaitingCapture { .. } => Ok(()),
            _ => Err(self.invalid(operation)),
        }
    }

    fn require_awaiting_decision(&self, operation: &'static str) -> CaptureResult<()> {
        match self.state() {
            SequencerState::AwaitingDecision { .. } => Ok(()),
            _ => Err(self.invalid(operation)),
        }
    }

    fn invalid(&self, operation: &'static str) -> CaptureError {
        CaptureError::InvalidState {
            operation,
            state: self.state().to_string(),
        }
    }
}
