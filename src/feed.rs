//! Live frame feed.
//!
//! The feed is passive: whoever owns the scheduler (the terminal shell ticks it
//! every `feed.poll_interval_ms`) calls [`FrameFeed::poll`], and the sequencer
//! asks for a [`FrameFeed::snapshot`] when the operator presses capture.

use tracing::{debug, warn};

use crate::frame::{Frame, FrameSource};

/// Owns the frame source and the most recently polled frame.
pub struct FrameFeed {
    source: Box<dyn FrameSource>,
    latest: Option<Frame>,
    polls: u64,
    misses: u64,
}

impl FrameFeed {
    /// Creates a feed around `source`. No frame is available until the first poll.
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self {
            source,
            latest: None,
            polls: 0,
            misses: 0,
        }
    }

    /// Reads once from the source.
    ///
    /// Returns the new frame, or `None` if the source produced nothing this tick.
    /// Source errors are logged and count as a miss; the previous frame stays
    /// available through [`snapshot`](Self::snapshot).
    pub fn poll(&mut self) -> Option<Frame> {
        self.polls += 1;
        match self.source.read_frame() {
            Ok(Some(frame)) => {
                self.latest = Some(frame.clone());
                Some(frame)
            }
            Ok(None) => {
                self.misses += 1;
                debug!(source = self.source.name(), "no frame this tick");
                None
            }
            Err(err) => {
                self.misses += 1;
                warn!(source = self.source.name(), error = %err, "frame source read failed");
                None
            }
        }
    }

    /// The last successfully polled frame.
    ///
    /// Frames are immutable, so the returned value is a self-consistent copy that
    /// later polls cannot change.
    pub fn snapshot(&self) -> Option<Frame> {
        self.latest.clone()
    }

    /// Name of the underlying source.
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Total polls and how many of them yielded nothing.
    pub fn stats(&self) -> (u64, u64) {
        (self.polls, self.misses)
    }
}

impl std::fmt::Debug for FrameFeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameFeed")
            .field("source", &self.source.name())
            .field("has_frame", &self.latest.is_some())
            .field("polls", &self.polls)
            .field("misses", &self.misses)
            .finish()
    }
}
