//! Scan configuration.
//!
//! Everything the engine needs to know about a scan is collected here once
//! and handed to [`ProbeSession`](crate::session::ProbeSession) by reference.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::grid::GridSpec;
use crate::protocol::FirmwareDialect;
use crate::timing::{TimingConfig, TimingModel};

/// Default feed rate for probing moves, in mm/min.
pub const DEFAULT_FEED_RATE: f64 = 3000.0;

/// Default head height during probing moves, in mm.
pub const DEFAULT_CLEARANCE: f64 = 5.0;

/// Settings for one scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanConfig {
    /// Firmware dialect spoken by the printer.
    pub dialect: FirmwareDialect,
    /// Probing area.
    pub grid: GridSpec,
    /// Feed rate for moves, in mm/min.
    pub feed_rate: f64,
    /// Measure the leveling compensation and subtract it from the raw map.
    pub leveling: bool,
    /// Z height of the head during moves.
    pub clearance: f64,
    /// Timing constants.
    pub timing: TimingConfig,
    /// Diagnostic verbosity; 1 logs every raw reply.
    pub verbose: u8,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            dialect: FirmwareDialect::default(),
            grid: GridSpec::default(),
            feed_rate: DEFAULT_FEED_RATE,
            leveling: false,
            clearance: DEFAULT_CLEARANCE,
            timing: TimingConfig::default(),
            verbose: 0,
        }
    }
}

impl ScanConfig {
    /// Create a configuration for `dialect` and `grid` with default settings.
    pub fn new(dialect: FirmwareDialect, grid: GridSpec) -> Self {
        Self {
            dialect,
            grid,
            ..Default::default()
        }
    }

    /// Set the feed rate.
    #[must_use]
    pub fn with_feed_rate(mut self, feed_rate: f64) -> Self {
        self.feed_rate = feed_rate;
        self
    }

    /// Enable or disable the leveling-compensation pass.
    #[must_use]
    pub fn with_leveling(mut self, leveling: bool) -> Self {
        self.leveling = leveling;
        self
    }

    /// Set the probe clearance height.
    #[must_use]
    pub fn with_clearance(mut self, clearance: f64) -> Self {
        self.clearance = clearance;
        self
    }

    /// Override the probe settle delay of the dialect.
    #[must_use]
    pub fn with_probe_settle(mut self, settle: Duration) -> Self {
        self.timing.probe_settle = Some(settle);
        self
    }

    /// Replace the timing constants.
    #[must_use]
    pub fn with_timing(mut self, timing: TimingConfig) -> Self {
        self.timing = timing;
        self
    }

    /// Set diagnostic verbosity.
    #[must_use]
    pub fn with_verbose(mut self, verbose: u8) -> Self {
        self.verbose = verbose;
        self
    }

    /// Reject configurations that cannot produce a scan.
    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        if !self.feed_rate.is_finite() || self.feed_rate <= 0.0 {
            return Err(Error::Config(format!(
                "feed rate must be positive, got {}",
                self.feed_rate
            )));
        }
        if !self.clearance.is_finite() || self.clearance < 0.0 {
            return Err(Error::Config(format!(
                "clearance must be zero or positive, got {}",
                self.clearance
            )));
        }
        self.timing.validate()
    }

    /// Timing model for these constants.
    pub fn timing_model(&self) -> Result<TimingModel> {
        TimingModel::new(self.timing.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dialect, FirmwareDialect::ModernMarlin);
        assert!(!config.leveling);
    }

    #[test]
    fn test_builder() {
        let config = ScanConfig::new(FirmwareDialect::Legacy, GridSpec::new(100.0, 80.0, 20.0))
            .with_feed_rate(1500.0)
            .with_leveling(true)
            .with_clearance(3.0)
            .with_probe_settle(Duration::from_secs(1))
            .with_verbose(1);

        assert_eq!(config.dialect, FirmwareDialect::Legacy);
        assert_eq!(config.feed_rate, 1500.0);
        assert!(config.leveling);
        assert_eq!(config.clearance, 3.0);
        assert_eq!(config.timing.probe_settle, Some(Duration::from_secs(1)));
        assert_eq!(config.verbose, 1);
    }

    #[test]
    fn test_validate_rejections() {
        let bad_feed = ScanConfig::default().with_feed_rate(0.0);
        assert!(matches!(bad_feed.validate(), Err(Error::Config(_))));

        let bad_clearance = ScanConfig::default().with_clearance(-1.0);
        assert!(bad_clearance.validate().is_err());

        let bad_grid = ScanConfig::new(FirmwareDialect::Legacy, GridSpec::new(10.0, 10.0, 0.0));
        assert!(bad_grid.validate().is_err());
    }
}
