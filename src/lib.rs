//! Core library for the mtf_capture application.
//!
//! This library drives a Miniscope MTF calibration run: it walks the operator
//! through one capture per LPS target, controls the LED illuminator over a
//! serial link and collects scores into an ordered table for export. It is used
//! by the terminal shell in `main.rs` and can be driven by any other front end
//! through [`session::CaptureSession`].

pub mod config;
pub mod error;
pub mod export;
pub mod feed;
pub mod frame;
pub mod frame_store;
pub mod hardware;
pub mod illumination;
pub mod results;
pub mod scorer;
pub mod sequencer;
pub mod session;
pub mod shell;
pub mod testing;

/// Lines-per-mm identifier of a calibration target.
pub type Lps = u32;

pub use error::{CaptureError, CaptureResult, ErrorKind};
pub use session::CaptureSession;
