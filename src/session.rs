//! The capture session: one owned object the UI shell drives.
//!
//! A session composes the sequencer (which owns its results), the live feed, the
//! LED controller and the frame store. The shell never reaches past it: it
//! ticks the feed, forwards operator commands and renders [`CaptureSession::banner`].
//!
//! Illumination runs on its own lifeline. Connect and power errors are handed
//! back for display and leave the capture sequence exactly where it was.

use tracing::{info, warn};

use crate::error::{CaptureError, CaptureResult};
use crate::export::{ExportBridge, ExportOutcome};
use crate::feed::FrameFeed;
use crate::frame::{CapturedFrame, Frame};
use crate::frame_store::FrameStore;
use crate::illumination::{IlluminationController, IlluminationState};
use crate::results::{ResultAggregator, ResultSet};
use crate::scorer::Scorer;
use crate::sequencer::{Resolution, Sequencer, SequencerState};
use crate::Lps;

/// A running calibration capture.
#[derive(Debug)]
pub struct CaptureSession {
    sequencer: Sequencer,
    feed: FrameFeed,
    illumination: IlluminationController,
    store: Option<FrameStore>,
}

impl CaptureSession {
    /// Starts a session over `targets`.
    ///
    /// With `store` set, accepted frames are written to disk before scoring.
    ///
    /// # Errors
    /// Target validation errors from [`Sequencer::begin`]; nothing is started.
    pub fn begin(
        targets: Vec<Lps>,
        feed: FrameFeed,
        illumination: IlluminationController,
        store: Option<FrameStore>,
    ) -> CaptureResult<Self> {
        let sequencer = Sequencer::begin(targets)?;
        info!(source = feed.source_name(), "capture session ready");
        Ok(Self {
            sequencer,
            feed,
            illumination,
            store,
        })
    }

    /// Scheduler tick: polls the feed once and returns the fresh frame.
    pub fn tick(&mut self) -> Option<Frame> {
        self.feed.poll()
    }

    /// Latest live frame, for rendering.
    pub fn live_frame(&self) -> Option<Frame> {
        self.feed.snapshot()
    }

    /// Freezes the live frame as the candidate for the current target.
    pub fn capture(&mut self) -> CaptureResult<&CapturedFrame> {
        let snapshot = self.feed.snapshot();
        self.sequencer.capture(snapshot)
    }

    /// Operator rejects the candidate.
    pub fn retake(&mut self) -> CaptureResult<Resolution> {
        self.sequencer.retake()
    }

    /// Operator accepts the candidate: save it, score it, apply the outcome.
    ///
    /// If saving or scoring fails the candidate is dropped and the same target
    /// is solicited again.
    pub fn accept(&mut self, scorer: &mut dyn Scorer) -> CaptureResult<Resolution> {
        let mut candidate = self.sequencer.accept()?;

        if let Some(store) = &self.store {
            match store.persist(&candidate) {
                Ok(path) => candidate = candidate.with_path(path),
                Err(err) => {
                    self.sequencer.abandon_scoring()?;
                    return Err(err);
                }
            }
        }

        let outcome = match scorer.score(&candidate) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.sequencer.abandon_scoring()?;
                return Err(CaptureError::Scorer(err));
            }
        };
        drop(candidate);
        self.sequencer.resolve(outcome)
    }

    /// Opens the LED port.
    pub fn connect(&mut self, port: &str) -> CaptureResult<()> {
        self.illumination.connect(port)
    }

    /// Sets the LED power; silently ignored while disconnected.
    pub fn set_power(&mut self, level: u8) -> CaptureResult<()> {
        self.illumination.set_power(level)
    }

    /// Releases the LED port.
    pub fn disconnect(&mut self) {
        self.illumination.disconnect();
    }

    /// LED controller state.
    pub fn illumination(&self) -> &IlluminationState {
        self.illumination.state()
    }

    /// Sequencer state.
    pub fn state(&self) -> SequencerState {
        self.sequencer.state()
    }

    /// Read access to the sequencer.
    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    /// Scores recorded so far.
    pub fn results(&self) -> &ResultAggregator {
        self.sequencer.results()
    }

    /// True once every target is scored or skipped.
    pub fn is_complete(&self) -> bool {
        self.sequencer.is_complete()
    }

    /// Instruction text for the operator.
    pub fn banner(&self) -> String {
        match (self.sequencer.current_target(), self.sequencer.progress()) {
            (Ok(lps), Some((position, total))) => match self.sequencer.state() {
                SequencerState::AwaitingDecision { .. } => {
                    format!("Captured Image - LPS {lps}: accept or retake")
                }
                SequencerState::Scoring { .. } => format!("Scoring LPS {lps}..."),
                _ => format!("Please Take a Picture for {lps} LPS ({position}/ {total})"),
            },
            _ => "All LPS processed.".to_string(),
        }
    }

    /// Finalizes the results and exports them.
    ///
    /// # Errors
    /// [`CaptureError::SequenceNotComplete`] while targets remain, or the
    /// exporter's failure.
    pub fn finish(&mut self, bridge: &mut ExportBridge) -> CaptureResult<(ResultSet, ExportOutcome)> {
        let results = self.sequencer.finalize()?;
        if !self.sequencer.skipped().is_empty() {
            warn!(skipped = ?self.sequencer.skipped(), "some LPS targets were skipped");
        }
        let outcome = bridge.export(&results)?;
        self.illumination.disconnect();
        Ok((results, outcome))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::mock::{MockFrameSource, MockOpener, SyntheticSource};
    use crate::scorer::{ManualScorer, ScoreOutcome};
    use crate::testing::{RecordingExporter, ScriptedScorer};

    fn session(targets: Vec<Lps>) -> CaptureSession {
        CaptureSession::begin(
            targets,
            FrameFeed::new(Box::new(SyntheticSource::new(8, 8, 4))),
            IlluminationController::new(Box::new(MockOpener::new())),
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_capture_before_first_tick_has_no_frame() {
        let mut session = session(vec![23]);
        assert!(matches!(
            session.capture().unwrap_err(),
            CaptureError::NoFrameAvailable
        ));
        session.tick();
        assert_eq!(session.capture().unwrap().target(), 23);
    }

    #[test]
    fn test_banner_tracks_progress() {
        let mut session = session(vec![23, 40]);
        assert_eq!(session.banner(), "Please Take a Picture for 23 LPS (1/ 2)");
        session.tick();
        session.capture().unwrap();
        assert_eq!(session.banner(), "Captured Image - LPS 23: accept or retake");
        session
            .accept(&mut ManualScorer::with_outcome(ScoreOutcome::Numeric(1.5)))
            .unwrap();
        assert_eq!(session.banner(), "Please Take a Picture for 40 LPS (2/ 2)");
        session.tick();
        session.capture().unwrap();
        session
            .accept(&mut ManualScorer::with_outcome(ScoreOutcome::Skip))
            .unwrap();
        assert_eq!(session.banner(), "All LPS processed.");
    }

    #[test]
    fn test_illumination_failure_leaves_sequence_alone() {
        let mut session = CaptureSession::begin(
            vec![23],
            FrameFeed::new(Box::new(SyntheticSource::default())),
            IlluminationController::new(Box::new(MockOpener::new().refusing("COM7"))),
            None,
        )
        .unwrap();
        session.tick();
        session.capture().unwrap();
        assert!(session.connect("COM7").is_err());
        session.set_power(90).unwrap();
        assert!(matches!(
            session.state(),
            SequencerState::AwaitingDecision { target: 23, .. }
        ));
    }

    #[test]
    fn test_accept_saves_frame_before_scoring() {
        let dir = tempfile::tempdir().unwrap();
        let store = FrameStore::new(dir.path());
        let mut session = CaptureSession::begin(
            vec![29],
            FrameFeed::new(Box::new(SyntheticSource::new(4, 4, 2))),
            IlluminationController::new(Box::new(MockOpener::new())),
            Some(store),
        )
        .unwrap();
        session.tick();
        session.capture().unwrap();

        let expected = dir.path().join("29_image.png");
        let mut scorer = |capture: &CapturedFrame| -> anyhow::Result<ScoreOutcome> {
            let path = capture.path().ok_or_else(|| anyhow::anyhow!("no path"))?;
            anyhow::ensure!(path.exists(), "image not written");
            Ok(ScoreOutcome::Numeric(0.4))
        };
        session.accept(&mut scorer).unwrap();
        assert!(expected.exists());
        assert!(session.is_complete());
    }

    #[test]
    fn test_finish_before_complete_fails() {
        let mut session = session(vec![23]);
        let mut bridge = ExportBridge::new(Box::new(RecordingExporter::new()));
        assert!(matches!(
            session.finish(&mut bridge).unwrap_err(),
            CaptureError::SequenceNotComplete { remaining: 1 }
        ));
    }

    #[test]
    fn test_scorer_failure_requires_recapture() {
        let mut session = CaptureSession::begin(
            vec![23],
            FrameFeed::new(Box::new(MockFrameSource::new(vec![Some(
                Frame::new(1, 1, vec![5]).unwrap(),
            )]))),
            IlluminationController::new(Box::new(MockOpener::new())),
            None,
        )
        .unwrap();
        session.tick();
        session.capture().unwrap();
        let mut scorer = ScriptedScorer::default();
        assert!(matches!(
            session.accept(&mut scorer).unwrap_err(),
            CaptureError::Scorer(_)
        ));
        assert!(matches!(
            session.state(),
            SequencerState::AwaitingCapture { target: 23, .. }
        ));
        // The feed still holds the last frame, so the operator can recapture.
        assert!(session.capture().is_ok());
    }
}
