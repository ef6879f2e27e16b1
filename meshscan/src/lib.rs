//! # meshscan
//!
//! Measures how flat a 3D-printer bed is by probing it on a grid over a
//! serial G-code connection.
//!
//! The crate provides:
//!
//! - Firmware dialects (legacy and current Marlin) with pure reply decoders
//! - A timing model for waiting out moves and probes
//! - A probe session that scans the bed and, optionally, reads back the
//!   firmware's leveling compensation
//! - Assembly of the passes into a normalised height map
//!
//! ## Features
//!
//! - `native` (default): Native serial port support
//! - `serde`: Serialization support for data types
//!
//! ## Example
//!
//! ```rust,no_run
//! use meshscan::{HeightMapBuilder, ProbeSession, ScanConfig, ScanMode, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::default().with_leveling(true);
//!
//!     #[cfg(feature = "native")]
//!     {
//!         let mut port = meshscan::NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!         let mut session = ProbeSession::new(&mut port, &config)?;
//!         session.calibrate()?;
//!
//!         let offset = session.run_scan(config.grid, ScanMode::LevelingTaste, |_, _| {})?;
//!         let raw = session.run_scan(config.grid, ScanMode::RawHeight, |done, total| {
//!             println!("Probing {done}/{total}");
//!         })?;
//!
//!         let map = HeightMapBuilder::build(&raw, Some(&offset))?;
//!         print!("{map}");
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod config;
pub mod error;
pub mod grid;
pub mod heightmap;
pub mod port;
pub mod protocol;
pub mod script;
pub mod session;
pub mod timing;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker polled between cells and commands.
///
/// The checker should return `true` when the current scan should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
thread_local! {
    static TEST_INTERRUPT_FLAG: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Per-thread so parallel tests do not see each other's interrupts.
#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    static INSTALLED: OnceLock<()> = OnceLock::new();
    INSTALLED.get_or_init(|| set_interrupt_checker(|| TEST_INTERRUPT_FLAG.with(std::cell::Cell::get)));
    TEST_INTERRUPT_FLAG.with(|flag| flag.set(value));
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use port::{NativePort, NativePortEnumerator};
pub use {
    config::ScanConfig,
    error::{Error, ParseError, Result},
    grid::{CellStatus, GridSpec, MAX_CELLS, Position, ScanResult},
    heightmap::{HeightMap, HeightMapBuilder},
    port::{Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Calibration, Command, FirmwareDialect, LegacyCodec, MarlinCodec, ProtocolCodec, Reading},
    script::CommandScript,
    session::{ProbeSession, ScanMode, ScanStep, SessionState},
    timing::{TimingConfig, TimingModel},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
