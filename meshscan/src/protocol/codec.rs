//! G-code command encoding and dialect-specific reply decoding.
//!
//! Both dialects accept the same commands; they differ only in how replies
//! are laid out:
//!
//! | Reply            | Legacy                         | Modern Marlin                         |
//! |------------------|--------------------------------|---------------------------------------|
//! | `G30` probe      | `... endstops hit: Z:1.234`    | `Bed X: 10.00 Y: 10.00 Z: 1.234`      |
//! | `M114` position  | second `Z:` is millimetres     | second `Z:` is a step count           |
//! | `M503` settings  | `M92 ... Z400.00 ...`          | `M92 ... Z400.00 ...`                 |

use std::fmt;

use log::warn;

use super::dialect::{Calibration, FirmwareDialect};
use super::reply::{self, Z_MARKER};
use crate::error::ParseError;
use crate::grid::Position;

/// Marker of the endstop-trigger report printed by legacy firmware.
pub const ENDSTOP_MARKER: &str = "endstops";

/// Modern Marlin replies shorter than this carry no measurement.
///
/// A bare `ok` after `G30` means the probe is not configured for reporting;
/// the firmware accepted the command but measured nothing.
pub const MIN_PROBE_REPLY_LEN: usize = 10;

/// A firmware command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `G90`: absolute positioning.
    SetAbsolute,
    /// `G0`: linear move with explicit feed rate.
    Move {
        /// Target position.
        target: Position,
        /// Feed rate in mm/min.
        feed: f64,
    },
    /// `G30`: single bed probe.
    Probe,
    /// `M114`: report current position.
    ReportPosition,
    /// `M503`: report settings.
    ReportSettings,
    /// Verbatim line, e.g. from a startup file.
    Raw(String),
}

impl Command {
    /// Wire form of the command, newline terminated.
    pub fn build(&self) -> Vec<u8> {
        let mut line = self
            .to_string()
            .into_bytes();
        line.push(b'\n');
        line
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetAbsolute => write!(f, "G90"),
            // Z is always sent: firmware disagrees on what an omitted Z means.
            Self::Move { target, feed } => write!(
                f,
                "G0 X{:.3} Y{:.3} Z{:.3} F{:.0}",
                target.x, target.y, target.z, feed
            ),
            Self::Probe => write!(f, "G30"),
            Self::ReportPosition => write!(f, "M114"),
            Self::ReportSettings => write!(f, "M503"),
            Self::Raw(line) => write!(f, "{line}"),
        }
    }
}

/// Outcome of decoding a probe reply.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Height reported by the firmware.
    Measured(f64),
    /// Firmware answered without a measurement; the value is a stand-in.
    Assumed(f64),
}

impl Reading {
    /// The height, measured or not.
    pub fn value(&self) -> f64 {
        match self {
            Self::Measured(v) | Self::Assumed(v) => *v,
        }
    }

    /// Whether the height came from the firmware.
    pub fn is_measured(&self) -> bool {
        matches!(self, Self::Measured(_))
    }
}

/// Command encoding and reply decoding for one firmware dialect.
///
/// Decoders are pure: the same bytes always give the same result, and
/// malformed input yields a [`ParseError`] rather than a panic.
pub trait ProtocolCodec: Send {
    /// Dialect implemented by this codec.
    fn dialect(&self) -> FirmwareDialect;

    /// Switch to absolute positioning.
    fn encode_set_absolute(&self) -> Command {
        Command::SetAbsolute
    }

    /// Absolute linear move to `target` at `feed` mm/min.
    fn encode_move(&self, target: Position, feed: f64) -> Command {
        Command::Move { target, feed }
    }

    /// Trigger a bed probe at the current XY position.
    fn encode_probe(&self) -> Command {
        Command::Probe
    }

    /// Query the live position.
    fn encode_report_position(&self) -> Command {
        Command::ReportPosition
    }

    /// Query the settings, including steps per unit.
    fn encode_report_settings(&self) -> Command {
        Command::ReportSettings
    }

    /// Extract the probed height from a `G30` reply.
    fn decode_probe_height(&self, reply: &[u8]) -> Result<Reading, ParseError>;

    /// Extract the Z position in millimetres from an `M114` reply.
    fn decode_position(&self, reply: &[u8]) -> Result<f64, ParseError>;

    /// Extract the Z steps per unit from an `M503` reply.
    fn decode_steps_per_unit(&self, reply: &[u8]) -> Result<f64, ParseError> {
        reply::steps_per_unit(reply)
    }
}

/// Codec for legacy firmware.
#[derive(Debug, Clone, Copy, Default)]
pub struct LegacyCodec;

impl ProtocolCodec for LegacyCodec {
    fn dialect(&self) -> FirmwareDialect {
        FirmwareDialect::Legacy
    }

    fn decode_probe_height(&self, reply: &[u8]) -> Result<Reading, ParseError> {
        let text = reply::text(reply);
        let hit = reply::after(&text, ENDSTOP_MARKER)?;
        let z = reply::after(hit, Z_MARKER)?;
        reply::leading_number(z).map(Reading::Measured)
    }

    fn decode_position(&self, reply: &[u8]) -> Result<f64, ParseError> {
        let text = reply::text(reply);
        reply::leading_number(reply::after_nth(&text, Z_MARKER, 1)?)
    }
}

/// Codec for current Marlin firmware.
#[derive(Debug, Clone, Copy)]
pub struct MarlinCodec {
    calibration: Calibration,
}

impl MarlinCodec {
    /// Create a codec converting step counts with `calibration`.
    pub fn new(calibration: Calibration) -> Self {
        Self { calibration }
    }

    /// Calibration captured at construction.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }
}

impl ProtocolCodec for MarlinCodec {
    fn dialect(&self) -> FirmwareDialect {
        FirmwareDialect::ModernMarlin
    }

    fn decode_probe_height(&self, reply: &[u8]) -> Result<Reading, ParseError> {
        if reply.len() < MIN_PROBE_REPLY_LEN {
            warn!(
                "Probe reply too short ({} bytes), assuming 0.0; check the probe reporting settings",
                reply.len()
            );
            return Ok(Reading::Assumed(0.0));
        }
        let text = reply::text(reply);
        reply::number_to_eol(reply::after(&text, Z_MARKER)?).map(Reading::Measured)
    }

    fn decode_position(&self, reply: &[u8]) -> Result<f64, ParseError> {
        let text = reply::text(reply);
        let steps = reply::leading_number(reply::after_nth(&text, Z_MARKER, 1)?)?;
        Ok(self
            .calibration
            .steps_to_mm(steps))
    }
}
