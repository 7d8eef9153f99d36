//! Custom error types for the capture orchestrator.
//!
//! This module defines the primary error type, `CaptureError`, for the whole crate.
//! Using the `thiserror` crate, it gives the UI shell one consistent type to match on,
//! while [`CaptureError::kind`] sorts every variant into one of four buckets so the
//! shell can decide who needs to hear about it:
//!
//! - **`UserInput`**: the operator asked for something that cannot be done right now
//!   (no LPS selected, no frame to capture). Recoverable, no state was mutated.
//! - **`Protocol`**: the caller invoked an operation that is invalid for the current
//!   sequencer state (e.g. deciding before capturing). These point at the call site,
//!   not at the operator.
//! - **`Device`**: serial port, frame source or filesystem failures. Never fatal to the
//!   capture session; `connect` can simply be retried.
//! - **`Collaborator`**: the scorer or exporter failed. Their causes are carried
//!   opaquely as `anyhow::Error`.
//!
//! By using `#[from]`, `CaptureError` can be created from the underlying error types
//! with the `?` operator.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::Lps;

/// Convenience alias for results using the crate error type.
pub type CaptureResult<T> = std::result::Result<T, CaptureError>;

/// Who should act on an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tell the operator; nothing changed.
    UserInput,
    /// Fix the call site; the operation is invalid in the current state.
    Protocol,
    /// Hardware or filesystem trouble; retryable.
    Device,
    /// Scorer or exporter failure, passed through untouched.
    Collaborator,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorKind::UserInput => "input",
            ErrorKind::Protocol => "sequencing",
            ErrorKind::Device => "device",
            ErrorKind::Collaborator => "collaborator",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug)]
#[allow(missing_docs)]
pub enum CaptureError {
    #[error("You must select at least one LPS")]
    EmptyTargetList,

    #[error("LPS values must be positive integers, got {0}")]
    InvalidTarget(Lps),

    #[error("No image to capture")]
    NoFrameAvailable,

    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: String,
    },

    #[error("All LPS processed; there is no current target")]
    SequenceComplete,

    #[error("Results cannot be finalized: {remaining} LPS target(s) still pending")]
    SequenceNotComplete { remaining: usize },

    #[error("LPS {0} appears more than once")]
    DuplicateTarget(Lps),

    #[error("Failed to connect to {port}: {cause}")]
    PortOpen { port: String, cause: String },

    #[error("Failed to write to serial port {port}: {source}")]
    SerialWrite {
        port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Frame has {actual} bytes, expected {expected} for {width}x{height}")]
    InvalidFrame {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Frame source error: {0}")]
    FrameSource(String),

    #[error("Failed to save captured image to {path:?}: {source}")]
    FrameStore {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] figment::Error),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),

    #[error("Scorer failed: {0:#}")]
    Scorer(anyhow::Error),

    #[error(transparent)]
    Exporter(anyhow::Error),
}

impl CaptureError {
    /// Classifies the error for the UI shell.
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::EmptyTargetList
            | CaptureError::InvalidTarget(_)
            | CaptureError::NoFrameAvailable
            | CaptureError::Config(_)
            | CaptureError::Configuration(_) => ErrorKind::UserInput,
            CaptureError::InvalidState { .. }
            | CaptureError::SequenceComplete
            | CaptureError::SequenceNotComplete { .. }
            | CaptureError::DuplicateTarget(_) => ErrorKind::Protocol,
            CaptureError::PortOpen { .. }
            | CaptureError::SerialWrite { .. }
            | CaptureError::InvalidFrame { .. }
            | CaptureError::FrameSource(_)
            | CaptureError::FrameStore { .. }
            | CaptureError::Io(_)
            | CaptureError::FeatureNotEnabled(_) => ErrorKind::Device,
            CaptureError::Scorer(_) | CaptureError::Exporter(_) => ErrorKind::Collaborator,
        }
    }
}
