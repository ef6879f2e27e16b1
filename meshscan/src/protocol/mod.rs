//! Firmware protocol: commands, dialects and reply decoding.

pub mod codec;
pub mod dialect;
pub mod reply;

// Re-export common types
pub use codec::{Command, LegacyCodec, MarlinCodec, ProtocolCodec, Reading};
pub use dialect::{Calibration, FirmwareDialect};
