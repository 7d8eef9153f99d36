//! `serialport`-backed transport for the LED driver.
//!
//! The driver firmware listens at 115200 baud, 8N1, with no flow control.

use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::illumination::{SerialTransport, TransportOpener};

#[cfg(feature = "instrument_serial")]
use anyhow::Context;
#[cfg(not(feature = "instrument_serial"))]
use crate::error::CaptureError;

/// Opens real serial ports.
#[derive(Debug, Clone)]
pub struct SerialportOpener {
    baud_rate: u32,
    timeout: Duration,
}

impl SerialportOpener {
    /// Opener for the given link settings.
    ///
    /// # Arguments
    /// * `baud_rate` - Communication speed (115200 for the LED driver)
    /// * `timeout` - Write timeout
    pub fn new(baud_rate: u32, timeout: Duration) -> Self {
        Self { baud_rate, timeout }
    }

    /// Configured baud rate.
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

#[cfg(feature = "instrument_serial")]
mod serial_enabled {
    use super::*;
    use std::io::{self, Write};

    pub(super) struct SerialportTransport {
        pub(super) port: Box<dyn serialport::SerialPort>,
    }

    impl SerialTransport for SerialportTransport {
        fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.port.write_all(bytes)?;
            self.port.flush()
        }

        fn clear(&mut self) -> io::Result<()> {
            self.port
                .clear(serialport::ClearBuffer::All)
                .map_err(io::Error::from)
        }
    }
}

impl TransportOpener for SerialportOpener {
    #[cfg(feature = "instrument_serial")]
    fn open(&mut self, port: &str) -> Result<Box<dyn SerialTransport>> {
        let handle = serialport::new(port, self.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(self.timeout)
            .open()
            .with_context(|| {
                format!(
                    "Failed to open serial port '{}' at {} baud",
                    port, self.baud_rate
                )
            })?;
        debug!(port, baud_rate = self.baud_rate, "serial port opened");
        Ok(Box::new(serial_enabled::SerialportTransport { port: handle }))
    }

    #[cfg(not(feature = "instrument_serial"))]
    fn open(&mut self, port: &str) -> Result<Box<dyn SerialTransport>> {
        debug!(port, "serial support compiled out");
        Err(CaptureError::FeatureNotEnabled("instrument_serial".to_string()).into())
    }
}

/// Names of the serial ports present on this machine.
#[cfg(feature = "instrument_serial")]
pub fn available_ports() -> Result<Vec<String>> {
    let ports = serialport::available_ports().context("Failed to enumerate serial ports")?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}

/// Names of the serial ports present on this machine.
#[cfg(not(feature = "instrument_serial"))]
pub fn available_ports() -> Result<Vec<String>> {
    Err(CaptureError::FeatureNotEnabled("instrument_serial".to_string()).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opener_keeps_settings() {
        let opener = SerialportOpener::new(115_200, Duration::from_millis(100));
        assert_eq!(opener.baud_rate(), 115_200);
    }

    #[test]
    fn test_missing_port_fails_cleanly() {
        let mut opener = SerialportOpener::new(115_200, Duration::from_millis(100));
        assert!(opener.open("/dev/mtf-capture-no-such-port").is_err());
    }
}
