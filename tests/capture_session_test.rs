//! End-to-end capture sessions against mock hardware and scripted collaborators.
//!
//! Run with: cargo test --test capture_session_test

use mtf_capture::export::{ExportBridge, ExportOutcome};
use mtf_capture::feed::FrameFeed;
use mtf_capture::frame::Frame;
use mtf_capture::frame_store::FrameStore;
use mtf_capture::hardware::mock::{MockFrameSource, MockOpener, MockWire, SyntheticSource};
use mtf_capture::illumination::IlluminationController;
use mtf_capture::scorer::ScoreOutcome;
use mtf_capture::sequencer::{Resolution, SequencerState};
use mtf_capture::testing::{RecordingExporter, ScriptedScorer};
use mtf_capture::{CaptureError, CaptureSession, ErrorKind, Lps};

fn rig(targets: Vec<Lps>) -> (CaptureSession, MockWire) {
    let opener = MockOpener::new();
    let wire = opener.wire();
    let session = CaptureSession::begin(
        targets,
        FrameFeed::new(Box::new(SyntheticSource::new(16, 8, 4))),
        IlluminationController::new(Box::new(opener)),
        None,
    )
    .unwrap();
    (session, wire)
}

/// Ticks the feed, captures and accepts with `scorer`.
fn cycle(session: &mut CaptureSession, scorer: &mut ScriptedScorer) -> Resolution {
    session.tick();
    session.capture().unwrap();
    session.accept(scorer).unwrap()
}

fn assert_invariants(session: &CaptureSession) {
    let seq = session.sequencer();
    assert_eq!(
        session.results().len() + seq.remaining(),
        seq.initial_len() - seq.skipped().len(),
        "recorded + remaining must equal selected - skipped"
    );
    assert!(seq.cursor() <= seq.targets().len());
    assert_eq!(session.is_complete(), seq.cursor() == seq.targets().len());
}

#[test]
fn test_two_targets_scored_and_exported_in_order() {
    let (mut session, _) = rig(vec![23, 40]);
    let mut scorer =
        ScriptedScorer::new([ScoreOutcome::Numeric(1.5), ScoreOutcome::Numeric(0.7)]);

    cycle(&mut session, &mut scorer);
    assert_invariants(&session);
    cycle(&mut session, &mut scorer);
    assert!(session.is_complete());

    let exporter = RecordingExporter::new();
    let log = exporter.log();
    let mut bridge = ExportBridge::new(Box::new(exporter));
    let (results, outcome) = session.finish(&mut bridge).unwrap();

    assert_eq!(results.pairs(), &[(23, 1.5), (40, 0.7)]);
    assert!(matches!(outcome, ExportOutcome::Saved(_)));
    assert_eq!(log.exports(), vec![results]);
}

#[test]
fn test_single_target_skipped_yields_empty_results() {
    let (mut session, _) = rig(vec![23]);
    let mut scorer = ScriptedScorer::new([ScoreOutcome::Skip]);

    let resolution = cycle(&mut session, &mut scorer);
    assert_eq!(resolution, Resolution::Skipped { target: 23 });
    assert!(session.sequencer().targets().is_empty());
    assert!(session.is_complete());
    assert_eq!(session.state(), SequencerState::Complete);

    let mut bridge = ExportBridge::new(Box::new(RecordingExporter::new()));
    let (results, _) = session.finish(&mut bridge).unwrap();
    assert!(results.is_empty());
}

#[test]
fn test_skip_in_middle_solicits_next_target() {
    let (mut session, _) = rig(vec![23, 26, 29]);
    let mut scorer = ScriptedScorer::new([
        ScoreOutcome::Numeric(2.0),
        ScoreOutcome::Skip,
        ScoreOutcome::Numeric(1.0),
    ]);

    cycle(&mut session, &mut scorer);
    assert_eq!(session.sequencer().current_target().unwrap(), 26);
    cycle(&mut session, &mut scorer);
    assert_eq!(session.sequencer().targets().as_slice(), &[23, 29]);
    assert_eq!(session.sequencer().current_target().unwrap(), 29);
    assert_eq!(session.banner(), "Please Take a Picture for 29 LPS (2/ 2)");
    assert_invariants(&session);

    cycle(&mut session, &mut scorer);
    let mut bridge = ExportBridge::new(Box::new(RecordingExporter::new()));
    let (results, _) = session.finish(&mut bridge).unwrap();
    assert_eq!(results.pairs(), &[(23, 2.0), (29, 1.0)]);
}

#[test]
fn test_operator_retake_needs_a_fresh_capture() {
    let frames = (1..=3)
        .map(|v| Some(Frame::new(1, 1, vec![v]).unwrap()))
        .collect();
    let mut session = CaptureSession::begin(
        vec![45],
        FrameFeed::new(Box::new(MockFrameSource::new(frames))),
        IlluminationController::new(Box::new(MockOpener::new())),
        None,
    )
    .unwrap();

    session.tick();
    let first = session.capture().unwrap().capture_id();
    session.retake().unwrap();
    assert_eq!(session.sequencer().cursor(), 0);
    assert_eq!(session.sequencer().targets().as_slice(), &[45]);

    let mut scorer = ScriptedScorer::new([ScoreOutcome::Numeric(0.3)]);
    let err = session.accept(&mut scorer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Protocol);

    session.tick();
    let candidate = session.capture().unwrap();
    assert_ne!(candidate.capture_id(), first);
    assert_eq!(candidate.frame().pixels(), &[2]);
    session.accept(&mut scorer).unwrap();
    assert_eq!(scorer.calls(), 1);
}

#[test]
fn test_results_follow_acceptance_order_not_lps_value() {
    let (mut session, _) = rig(vec![128, 23, 64]);
    let mut scorer = ScriptedScorer::new([
        ScoreOutcome::Numeric(0.1),
        ScoreOutcome::Retake,
        ScoreOutcome::Numeric(0.9),
        ScoreOutcome::Numeric(0.4),
    ]);
    for _ in 0..4 {
        cycle(&mut session, &mut scorer);
        assert_invariants(&session);
    }
    assert_eq!(
        session.results().pairs(),
        &[(128, 0.1), (23, 0.9), (64, 0.4)]
    );
}

#[test]
fn test_empty_selection_builds_nothing() {
    let err = CaptureSession::begin(
        vec![],
        FrameFeed::new(Box::new(SyntheticSource::default())),
        IlluminationController::new(Box::new(MockOpener::new())),
        None,
    )
    .unwrap_err();
    assert!(matches!(err, CaptureError::EmptyTargetList));
    assert_eq!(err.kind(), ErrorKind::UserInput);
}

#[test]
fn test_illumination_changes_mid_decision() {
    let (mut session, wire) = rig(vec![23]);
    session.connect("COM3").unwrap();
    session.tick();
    session.capture().unwrap();

    session.set_power(128).unwrap();
    session.set_power(64).unwrap();
    assert!(matches!(
        session.state(),
        SequencerState::AwaitingDecision { target: 23, .. }
    ));
    assert_eq!(wire.bytes(), vec![0x34, 0x6E, 0x80, 0x34, 0x6E, 0x40]);

    let mut scorer = ScriptedScorer::new([ScoreOutcome::Numeric(1.0)]);
    session.accept(&mut scorer).unwrap();
    let mut bridge = ExportBridge::new(Box::new(RecordingExporter::new()));
    session.finish(&mut bridge).unwrap();
    assert_eq!(wire.open_handles(), 0);
    assert!(!session.illumination().is_connected);
}

#[test]
fn test_cancelled_export_is_reported() {
    let (mut session, _) = rig(vec![23]);
    cycle(&mut session, &mut ScriptedScorer::new([ScoreOutcome::Numeric(1.0)]));
    let mut bridge = ExportBridge::new(Box::new(RecordingExporter::cancelling()));
    let (_, outcome) = session.finish(&mut bridge).unwrap();
    assert_eq!(outcome, ExportOutcome::Cancelled);
}

#[test]
fn test_frames_saved_per_target() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = CaptureSession::begin(
        vec![23, 40],
        FrameFeed::new(Box::new(SyntheticSource::new(8, 8, 4))),
        IlluminationController::new(Box::new(MockOpener::new())),
        Some(FrameStore::new(dir.path())),
    )
    .unwrap();
    let mut scorer =
        ScriptedScorer::new([ScoreOutcome::Numeric(1.0), ScoreOutcome::Numeric(2.0)]);
    cycle(&mut session, &mut scorer);
    cycle(&mut session, &mut scorer);
    assert!(dir.path().join("23_image.png").is_file());
    assert!(dir.path().join("40_image.png").is_file());
}

#[test]
fn test_unwritable_image_dir_drops_candidate_without_scoring() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("captured_images");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let mut session = CaptureSession::begin(
        vec![23],
        FrameFeed::new(Box::new(SyntheticSource::new(4, 4, 2))),
        IlluminationController::new(Box::new(MockOpener::new())),
        Some(FrameStore::new(blocker.clone())),
    )
    .unwrap();
    session.tick();
    session.capture().unwrap();

    let mut scorer = ScriptedScorer::new([ScoreOutcome::Numeric(1.0)]);
    let err = session.accept(&mut scorer).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Device);
    assert_eq!(
        session.state(),
        SequencerState::AwaitingCapture {
            cursor: 0,
            target: 23
        }
    );
    assert_eq!(scorer.calls(), 0);
    assert!(session.results().is_empty());
    assert!(session.sequencer().candidate().is_none());
}
