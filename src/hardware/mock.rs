//! Mock Hardware Implementations
//!
//! Provides simulated devices for running a capture session without the rig.
//!
//! # Available Mocks
//!
//! - `MockOpener` / `MockWire` - Serial opener whose transports record every byte
//! - `MockFrameSource` - Camera that replays a scripted list of frames
//! - `SyntheticSource` - Camera producing a drifting bar pattern forever
//!
//! `MockWire` is a cheap shared handle, so a test can keep one after moving the
//! opener into an [`IlluminationController`](crate::illumination::IlluminationController)
//! and inspect what went out on the wire.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Result};

use crate::frame::{Frame, FrameSource};
use crate::illumination::{SerialTransport, TransportOpener};

// =============================================================================
// MockOpener - Simulated Serial Port
// =============================================================================

#[derive(Debug, Default)]
struct WireLog {
    bytes: Vec<u8>,
    opened: Vec<String>,
    open_handles: usize,
    fail_writes: bool,
}

/// Shared record of everything the mock transports did.
#[derive(Debug, Clone, Default)]
pub struct MockWire {
    log: Arc<Mutex<WireLog>>,
}

impl MockWire {
    fn lock(&self) -> MutexGuard<'_, WireLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every byte written so far, across all handles.
    pub fn bytes(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }

    /// Ports opened, in order.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Handles currently alive.
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    /// Makes subsequent writes fail with `BrokenPipe`.
    pub fn fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }
}

/// Opener that hands out recording transports.
#[derive(Debug, Default)]
pub struct MockOpener {
    wire: MockWire,
    refused: HashSet<String>,
}

impl MockOpener {
    /// Opener that accepts every port name.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `port` fail to open, like a missing or busy device.
    pub fn refusing(mut self, port: &str) -> Self {
        self.refused.insert(port.to_string());
        self
    }

    /// Handle to the shared wire log.
    pub fn wire(&self) -> MockWire {
        self.wire.clone()
    }
}

impl TransportOpener for MockOpener {
    fn open(&mut self, port: &str) -> Result<Box<dyn SerialTransport>> {
        if self.refused.contains(port) {
            return Err(anyhow!("Failed to open serial port '{port}': device not found"));
        }
        {
            let mut log = self.wire.lock();
            log.opened.push(port.to_string());
            log.open_handles += 1;
        }
        Ok(Box::new(MockTransport {
            wire: self.wire.clone(),
        }))
    }
}

struct MockTransport {
    wire: MockWire,
}

impl SerialTransport for MockTransport {
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut log = self.wire.lock();
        if log.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        log.bytes.extend_from_slice(bytes);
        Ok(())
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        let mut log = self.wire.lock();
        log.open_handles = log.open_handles.saturating_sub(1);
    }
}

// =============================================================================
// MockFrameSource - Scripted Camera
// =============================================================================

/// Camera that replays a fixed script, then reports "no frame" forever.
#[derive(Debug, Default)]
pub struct MockFrameSource {
    script: VecDeque<Option<Frame>>,
    error: Option<String>,
}

impl MockFrameSource {
    /// Replays `script` one entry per read. `None` entries are empty ticks.
    pub fn new(script: Vec<Option<Frame>>) -> Self {
        Self {
            script: script.into(),
            error: None,
        }
    }

    /// Source whose every read fails with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            script: VecDeque::new(),
            error: Some(message.to_string()),
        }
    }
}

impl FrameSource for MockFrameSource {
    fn name(&self) -> &str {
        "mock"
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        if let Some(message) = &self.error {
            return Err(anyhow!("{message}"));
        }
        Ok(self.script.pop_front().flatten())
    }
}

// =============================================================================
// SyntheticSource - Bar Pattern Camera
// =============================================================================

/// Camera that renders a vertical bar grating drifting one pixel per frame.
///
/// Useful for exercising the rig software on a bench with no camera attached.
#[derive(Debug, Clone)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    period: u32,
    frame_count: u64,
}

impl SyntheticSource {
    /// New source. `period` is the bar pair width in pixels (clamped to >= 2).
    pub fn new(width: u32, height: u32, period: u32) -> Self {
        Self {
            width,
            height,
            period: period.max(2),
            frame_count: 0,
        }
    }

    /// Frames produced so far.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new(640, 480, 16)
    }
}

impl FrameSource for SyntheticSource {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn read_frame(&mut self) -> Result<Option<Frame>> {
        let shift = self.frame_count;
        let half = u64::from(self.period / 2);
        let row: Vec<u8> = (0..u64::from(self.width))
            .map(|x| {
                if ((x + shift) / half) % 2 == 0 {
                    230
                } else {
                    25
                }
            })
            .collect();
        let mut pixels = Vec::with_capacity(row.len() * self.height as usize);
        for _ in 0..self.height {
            pixels.extend_from_slice(&row);
        }
        self.frame_count += 1;
        Ok(Some(Frame::new(self.width, self.height, pixels)?))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_wire_tracks_handles() {
        let mut opener = MockOpener::new();
        let wire = opener.wire();
        let mut port = opener.open("COM3").unwrap();
        port.write_all(b"4n\x10").unwrap();
        assert_eq!(wire.open_handles(), 1);
        drop(port);
        assert_eq!(wire.open_handles(), 0);
        assert_eq!(wire.bytes(), b"4n\x10".to_vec());
    }

    #[test]
    fn test_mock_opener_refuses_port() {
        let mut opener = MockOpener::new().refusing("COM1");
        assert!(opener.open("COM1").is_err());
        assert!(opener.open("COM2").is_ok());
        assert_eq!(opener.wire().opened(), vec!["COM2".to_string()]);
    }

    #[test]
    fn test_scripted_source_runs_dry() {
        let frame = Frame::new(1, 1, vec![9]).unwrap();
        let mut source = MockFrameSource::new(vec![None, Some(frame)]);
        assert!(source.read_frame().unwrap().is_none());
        assert!(source.read_frame().unwrap().is_some());
        assert!(source.read_frame().unwrap().is_none());
    }

    #[test]
    fn test_synthetic_pattern_drifts() {
        let mut source = SyntheticSource::new(8, 2, 4);
        let first = source.read_frame().unwrap().unwrap();
        let second = source.read_frame().unwrap().unwrap();
        assert_eq!(first.pixels().len(), 16);
        assert_eq!(&first.pixels()[..4], &[230, 230, 25, 25]);
        assert_eq!(&second.pixels()[..4], &[230, 25, 25, 230]);
        assert_eq!(source.frame_count(), 2);
    }
}
