//! Error types for meshscan.

use std::io;
use thiserror::Error;

/// Result type for meshscan operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for meshscan operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, command files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// A firmware reply could not be decoded.
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Raw and offset grids do not have the same shape.
    #[error("Shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Shape of the raw grid as (rows, cols).
        expected: (usize, usize),
        /// Shape of the offending grid as (rows, cols).
        actual: (usize, usize),
    },

    /// Invalid scan or timing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serial port could not be reached.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Stopped by the embedding application between commands.
    #[error("Operation interrupted")]
    Interrupted,
}

impl Error {
    /// Whether this error came from the transport rather than from the data.
    pub fn is_transport(&self) -> bool {
        match self {
            Self::Io(_) | Self::DeviceNotFound(_) => true,
            #[cfg(feature = "native")]
            Self::Serial(_) => true,
            _ => false,
        }
    }
}

/// Failure to extract a value from a firmware reply.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// An expected marker is absent from the reply.
    #[error("marker {0:?} not found in reply")]
    MarkerNotFound(&'static str),

    /// The text after the marker is not a number.
    #[error("invalid number {0:?}")]
    InvalidNumber(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        let io_err = Error::Io(io::Error::new(io::ErrorKind::BrokenPipe, "gone"));
        assert!(io_err.is_transport());

        let parse_err = Error::Parse(ParseError::MarkerNotFound("Z:"));
        assert!(!parse_err.is_transport());

        let shape_err = Error::ShapeMismatch {
            expected: (3, 3),
            actual: (2, 2),
        };
        assert!(!shape_err.is_transport());
    }

    #[test]
    fn test_display_messages() {
        let err = Error::ShapeMismatch {
            expected: (3, 3),
            actual: (2, 2),
        };
        assert_eq!(
            err.to_string(),
            "Shape mismatch: expected (3, 3), got (2, 2)"
        );
        assert_eq!(
            ParseError::MarkerNotFound("endstops").to_string(),
            "marker \"endstops\" not found in reply"
        );
    }
}
