//! LED illuminator control over a serial link.
//!
//! Protocol Overview:
//! - Format: `4n` followed by one raw byte holding the power level (0-255)
//! - Encoding: single-byte (Latin-1) characters, no terminator, no checksum
//! - Timing: fire-and-forget, the illuminator never answers
//!
//! `set_power(128)` therefore puts exactly `0x34 0x6E 0x80` on the wire.
//!
//! The controller owns the transport handle outright. It is independent of the
//! capture sequence: a failed connect or write is reported to the caller and
//! never touches sequencing state.

use std::fmt;
use std::io;

use tracing::{debug, info, warn};

use crate::error::{CaptureError, CaptureResult};

/// Two-character tag that prefixes every power command.
pub const POWER_COMMAND_PREFIX: [u8; 2] = *b"4n";

/// Encodes a power-level command.
pub fn encode_power_command(level: u8) -> [u8; 3] {
    [POWER_COMMAND_PREFIX[0], POWER_COMMAND_PREFIX[1], level]
}

/// An open, write-only serial handle.
pub trait SerialTransport: Send {
    /// Writes and flushes `bytes`.
    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Discards anything buffered from a previous user of the port.
    fn clear(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Opens transports by port name ("COM3", "/dev/ttyACM0").
pub trait TransportOpener: Send {
    /// Opens `port`.
    fn open(&mut self, port: &str) -> anyhow::Result<Box<dyn SerialTransport>>;
}

/// Observable illuminator state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IlluminationState {
    /// Port of the live connection, if any.
    pub port: Option<String>,
    /// Whether a transport handle is held.
    pub is_connected: bool,
    /// Most recent level requested by the operator, sent or not.
    pub last_power_level: u8,
}

/// Serial link controller for the LED driver.
pub struct IlluminationController {
    opener: Box<dyn TransportOpener>,
    transport: Option<Box<dyn SerialTransport>>,
    state: IlluminationState,
}

impl IlluminationController {
    /// Disconnected controller that will use `opener` to reach the device.
    pub fn new(opener: Box<dyn TransportOpener>) -> Self {
        Self {
            opener,
            transport: None,
            state: IlluminationState::default(),
        }
    }

    /// Current state.
    pub fn state(&self) -> &IlluminationState {
        &self.state
    }

    /// Whether a transport is held.
    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    /// Opens `port`, releasing any handle held from an earlier connect first.
    ///
    /// # Errors
    /// [`CaptureError::PortOpen`] carrying the port name and the cause. The
    /// controller is left disconnected.
    pub fn connect(&mut self, port: &str) -> CaptureResult<()> {
        self.disconnect();

        let mut transport = self.opener.open(port).map_err(|err| {
            warn!(port, error = %err, "failed to open illumination port");
            CaptureError::PortOpen {
                port: port.to_string(),
                cause: format!("{err:#}"),
            }
        })?;
        transport.clear().map_err(|err| CaptureError::PortOpen {
            port: port.to_string(),
            cause: err.to_string(),
        })?;

        self.transport = Some(transport);
        self.state.port = Some(port.to_string());
        self.state.is_connected = true;
        info!(port, "illumination connected");
        Ok(())
    }

    /// Sends a power level. Does nothing (and succeeds) while disconnected.
    ///
    /// # Errors
    /// [`CaptureError::SerialWrite`] if the transport rejects the write. The
    /// handle is kept; the next call simply tries again.
    pub fn set_power(&mut self, level: u8) -> CaptureResult<()> {
        self.state.last_power_level = level;
        let Some(transport) = self.transport.as_mut() else {
            debug!(level, "illumination not connected; power level not sent");
            return Ok(());
        };

        let command = encode_power_command(level);
        transport
            .write_all(&command)
            .map_err(|source| CaptureError::SerialWrite {
                port: self.state.port.clone().unwrap_or_default(),
                source,
            })?;
        debug!(level, bytes = ?command, "power command sent");
        Ok(())
    }

    /// Releases the transport. Safe to call any number of times.
    pub fn disconnect(&mut self) {
        if self.transport.take().is_some() {
            info!(port = ?self.state.port, "illumination disconnected");
        }
        self.state.port = None;
        self.state.is_connected = false;
    }
}

impl Drop for IlluminationController {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl fmt::Debug for IlluminationController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IlluminationController")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
