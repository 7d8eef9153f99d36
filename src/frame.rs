//! Frame types shared by the live feed, the sequencer and the scorers.
//!
//! A [`Frame`] is an immutable 8-bit grayscale image. Its pixel buffer lives
//! behind an `Arc<[u8]>`, so handing a frame from the feed to the sequencer is
//! a cheap clone that can never observe a half-written image: the feed
//! replaces its latest frame wholesale, it never writes into one.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::error::{CaptureError, CaptureResult};
use crate::Lps;

/// Immutable grayscale frame.
#[derive(Debug, Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    pixels: Arc<[u8]>,
    captured_at: Instant,
}

impl Frame {
    /// Wraps a row-major 8-bit pixel buffer.
    ///
    /// # Errors
    /// Returns [`CaptureError::InvalidFrame`] if `pixels.len() != width * height`.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> CaptureResult<Self> {
        let expected = width as usize * height as usize;
        if pixels.len() != expected {
            return Err(CaptureError::InvalidFrame {
                width,
                height,
                expected,
                actual: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels: pixels.into(),
            captured_at: Instant::now(),
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row-major pixel data.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// When the source produced this frame.
    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    /// A zero-sized frame counts as "no image".
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }
}

/// Anything that can hand out the most recent camera frame.
///
/// Implementations are polled by [`FrameFeed`](crate::feed::FrameFeed) once per
/// scheduler tick and must not block for longer than a single device read.
/// `Ok(None)` means the device had nothing this tick.
pub trait FrameSource: Send {
    /// Human-readable source name for logs.
    fn name(&self) -> &str;

    /// Reads one frame.
    fn read_frame(&mut self) -> anyhow::Result<Option<Frame>>;
}

/// A frozen frame tagged with the LPS target it was taken for.
///
/// Owned by the sequencer until the operator decides; dropped on retake or once
/// the scorer has consumed it.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    capture_id: u64,
    target: Lps,
    frame: Frame,
    taken_at: Instant,
    path: Option<PathBuf>,
}

impl CapturedFrame {
    pub(crate) fn new(capture_id: u64, target: Lps, frame: Frame) -> Self {
        Self {
            capture_id,
            target,
            frame,
            taken_at: Instant::now(),
            path: None,
        }
    }

    /// Monotonic id, unique per capture within a session.
    pub fn capture_id(&self) -> u64 {
        self.capture_id
    }

    /// LPS value this frame was captured for.
    pub fn target(&self) -> Lps {
        self.target
    }

    /// The frozen image.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// When the operator pressed capture.
    pub fn taken_at(&self) -> Instant {
        self.taken_at
    }

    /// Where the frame was persisted, if it has been.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Attaches the on-disk location written by the frame store.
    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rejects_mismatched_buffer() {
        let err = Frame::new(4, 4, vec![0; 15]).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::InvalidFrame {
                expected: 16,
                actual: 15,
                ..
            }
        ));
    }

    #[test]
    fn test_frame_clone_shares_pixels() {
        let frame = Frame::new(2, 2, vec![1, 2, 3, 4]).unwrap();
        let copy = frame.clone();
        assert!(std::ptr::eq(frame.pixels(), copy.pixels()));
        assert!(!copy.is_empty());
    }

    #[test]
    fn test_zero_sized_frame_is_empty() {
        let frame = Frame::new(0, 0, Vec::new()).unwrap();
        assert!(frame.is_empty());
    }
}
