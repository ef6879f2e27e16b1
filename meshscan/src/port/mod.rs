//! Port abstraction for the serial link to the printer.
//!
//! The probing engine never touches a concrete serial port. It talks to a
//! [`Port`], which keeps the protocol layer testable against scripted replies
//! and lets the same session code run over any byte channel.
//!
//! ```text
//! +-------------------+
//! |   ProbeSession    |
//! | (codec + timing)  |
//! +---------+---------+
//!           |
//!           v
//! +---------+---------+
//! |    Port trait     |
//! +---------+---------+
//!           |
//!           v
//! +---------+---------+
//! | NativePort        |
//! |  (serialport)     |
//! +-------------------+
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use meshscan::port::Port;
//! use std::time::Duration;
//!
//! fn query<P: Port>(port: &mut P) -> meshscan::Result<Vec<u8>> {
//!     port.write_all_bytes(b"M114\n")?;
//!     port.read_available(Duration::from_millis(500))
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

use crate::error::Result;

/// Default baud rate of Marlin-style firmware.
pub const DEFAULT_BAUD: u32 = 115200;

/// Serial port configuration.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Timeout of a single blocking read.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: Duration::from_millis(100),
        }
    }
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Set the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Serial port information.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
}

/// Byte channel to the printer firmware.
pub trait Port: Read + Write + Send {
    /// Clear input/output buffers.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Get the port name/path.
    fn name(&self) -> &str;

    /// Close the port and release resources.
    ///
    /// After calling this method, the port cannot be used for further I/O.
    fn close(&mut self) -> Result<()>;

    /// Write all bytes, blocking until complete.
    fn write_all_bytes(&mut self, buf: &[u8]) -> Result<()> {
        std::io::Write::write_all(self, buf)?;
        std::io::Write::flush(self)?;
        Ok(())
    }

    /// Collect whatever the firmware sends within `max_wait`.
    ///
    /// Stops early once a read times out after some bytes have arrived, so a
    /// complete reply does not cost the full wait. Returns an empty buffer if
    /// the firmware stayed silent.
    fn read_available(&mut self, max_wait: Duration) -> Result<Vec<u8>> {
        let start = Instant::now();
        let mut reply = Vec::new();
        let mut buf = [0u8; 256];

        while start.elapsed() < max_wait {
            match self.read(&mut buf) {
                Ok(0) => {
                    if !reply.is_empty() {
                        break;
                    }
                },
                Ok(n) => reply.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == ErrorKind::TimedOut => {
                    if !reply.is_empty() {
                        break;
                    }
                },
                Err(e) if e.kind() == ErrorKind::Interrupted => {},
                Err(e) => return Err(e.into()),
            }
        }

        Ok(reply)
    }
}

/// Trait for listing available serial ports.
///
/// This is separated from `Port` because it's a static operation that
/// doesn't require an open port instance.
pub trait PortEnumerator {
    /// List all available serial ports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativePort, NativePortEnumerator};

#[cfg(test)]
mod tests {
    use super::mock::MockPort;
    use super::*;

    #[test]
    fn test_serial_config_builder() {
        let config = SerialConfig::new("/dev/ttyUSB0", 250000).with_timeout(Duration::from_secs(2));

        assert_eq!(config.port_name, "/dev/ttyUSB0");
        assert_eq!(config.baud_rate, 250000);
        assert_eq!(config.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_serial_config_default() {
        let config = SerialConfig::default();
        assert_eq!(config.baud_rate, DEFAULT_BAUD);
        assert!(config.port_name.is_empty());
    }

    #[test]
    fn test_read_available_collects_reply() {
        let mut port = MockPort::new();
        port.push_reply("X:0.00 Y:0.00 Z:5.00\nok\n");

        let reply = port
            .read_available(Duration::from_millis(200))
            .unwrap();
        assert_eq!(reply, b"X:0.00 Y:0.00 Z:5.00\nok\n");
    }

    #[test]
    fn test_read_available_silent_firmware() {
        let mut port = MockPort::new();
        let reply = port
            .read_available(Duration::from_millis(20))
            .unwrap();
        assert!(reply.is_empty());
    }

    #[test]
    fn test_write_all_bytes_records() {
        let mut port = MockPort::new();
        port.write_all_bytes(b"G90\n").unwrap();
        assert_eq!(port.sent_lines(), vec!["G90"]);
    }

    #[test]
    fn test_closed_port_rejects_io() {
        let mut port = MockPort::new();
        assert_eq!(port.name(), "mock");
        port.close().unwrap();
        assert!(port.is_closed());
        assert!(port.write_all_bytes(b"M114\n").is_err());
    }
}
