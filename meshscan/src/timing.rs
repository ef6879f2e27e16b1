//! How long to wait after a command before its reply is ready.
//!
//! The firmware acknowledges a move as soon as it is queued, not when the head
//! arrives, so the session sleeps for an estimate of the travel time before
//! probing. With the feed rate in mm/min, a factor of 60 converts
//! `distance / feed` into seconds; the defaults are higher to absorb
//! acceleration and are meant to be tuned per machine.

use std::time::Duration;

use crate::error::{Error, Result};
use crate::grid::GridSpec;
use crate::protocol::FirmwareDialect;

/// Default factor for homing and row-wrap travel.
pub const DEFAULT_TRAVEL_FACTOR: f64 = 150.0;

/// Default factor for a single-cell step within a row.
pub const DEFAULT_STEP_FACTOR: f64 = 120.0;

/// Default wait after a position or settings query.
pub const DEFAULT_QUERY_DELAY: Duration = Duration::from_millis(250);

/// Default window for collecting a reply once the wait has elapsed.
pub const DEFAULT_READ_WINDOW: Duration = Duration::from_secs(2);

/// Tunable timing constants.
#[derive(Debug, Clone, PartialEq)]
pub struct TimingConfig {
    /// Seconds per (mm / (mm/min)) for homing and row wraps.
    pub travel_factor: f64,
    /// Seconds per (mm / (mm/min)) for in-row steps.
    pub step_factor: f64,
    /// Overrides the dialect's probe settle delay.
    pub probe_settle: Option<Duration>,
    /// Wait after `M114`/`M503`.
    pub query_delay: Duration,
    /// Upper bound for collecting a reply after the wait.
    pub read_window: Duration,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            travel_factor: DEFAULT_TRAVEL_FACTOR,
            step_factor: DEFAULT_STEP_FACTOR,
            probe_settle: None,
            query_delay: DEFAULT_QUERY_DELAY,
            read_window: DEFAULT_READ_WINDOW,
        }
    }
}

impl TimingConfig {
    /// Check the factors are usable.
    ///
    /// Row wraps cover more ground than in-row steps, so the travel factor may
    /// not be smaller than the step factor.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("travel factor", self.travel_factor),
            ("step factor", self.step_factor),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(Error::Config(format!("{name} must be positive, got {value}")));
            }
        }
        if self.travel_factor < self.step_factor {
            return Err(Error::Config(format!(
                "travel factor {} is smaller than step factor {}",
                self.travel_factor, self.step_factor
            )));
        }
        Ok(())
    }
}

/// Wait-time policy for one session.
#[derive(Debug, Clone, Default)]
pub struct TimingModel {
    config: TimingConfig,
}

impl TimingModel {
    /// Create a timing model from validated constants.
    pub fn new(config: TimingConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Constants in use.
    pub fn config(&self) -> &TimingConfig {
        &self.config
    }

    /// Wait for a move of `distance` mm at `feed` mm/min.
    pub fn transit_delay(&self, distance: f64, feed: f64) -> Duration {
        scaled(self.config.step_factor, distance, feed)
    }

    /// Wait for the first move of a scan, from anywhere to the grid origin.
    pub fn homing_delay(&self, grid: &GridSpec, feed: f64) -> Duration {
        scaled(self.config.travel_factor, grid.diagonal(), feed)
    }

    /// Wait for the move back to the start of the next row.
    pub fn row_wrap_delay(&self, grid: &GridSpec, feed: f64) -> Duration {
        scaled(self.config.travel_factor, grid.row_return_distance(), feed)
    }

    /// Wait for a one-cell step within a row.
    pub fn step_delay(&self, grid: &GridSpec, feed: f64) -> Duration {
        self.transit_delay(grid.spacing, feed)
    }

    /// Wait before probing column `col` of a row.
    ///
    /// Column 0 is reached by a row wrap; under-waiting there reads the
    /// height while the head is still travelling.
    pub fn move_delay(&self, grid: &GridSpec, col: usize, feed: f64) -> Duration {
        if col == 0 {
            self.row_wrap_delay(grid, feed)
        } else {
            self.step_delay(grid, feed)
        }
    }

    /// Wait after a probe command.
    pub fn probe_settle_delay(&self, dialect: FirmwareDialect) -> Duration {
        self.config
            .probe_settle
            .unwrap_or_else(|| dialect.default_settle_delay())
    }

    /// Wait after a position or settings query.
    pub fn query_delay(&self) -> Duration {
        self.config.query_delay
    }

    /// Window for collecting a reply.
    pub fn read_window(&self) -> Duration {
        self.config.read_window
    }
}

fn scaled(factor: f64, distance: f64, feed: f64) -> Duration {
    let secs = factor * distance / feed;
    Duration::try_from_secs_f64(secs.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transit_delay_proportional() {
        let config = TimingConfig {
            step_factor: 60.0,
            travel_factor: 60.0,
            ..TimingConfig::default()
        };
        let model = TimingModel::new(config).unwrap();
        // 100 mm at 6000 mm/min takes one second.
        assert_eq!(model.transit_delay(100.0, 6000.0), Duration::from_secs(1));
        assert_eq!(model.transit_delay(200.0, 6000.0), Duration::from_secs(2));
        assert_eq!(model.transit_delay(0.0, 6000.0), Duration::ZERO);
    }

    #[test]
    fn test_row_wrap_not_shorter_than_step() {
        let model = TimingModel::default();
        for (x, y, spacing) in [
            (150.0, 150.0, 25.0),
            (200.0, 50.0, 10.0),
            (30.0, 30.0, 29.0),
            (220.0, 220.0, 1.0),
        ] {
            let grid = GridSpec::new(x, y, spacing);
            for feed in [300.0, 3000.0, 12000.0] {
                assert!(model.row_wrap_delay(&grid, feed) >= model.step_delay(&grid, feed));
                assert!(model.homing_delay(&grid, feed) >= model.row_wrap_delay(&grid, feed));
            }
        }
    }

    #[test]
    fn test_move_delay_selects_wrap_on_first_column() {
        let model = TimingModel::default();
        let grid = GridSpec::new(150.0, 150.0, 25.0);
        assert_eq!(model.move_delay(&grid, 0, 3000.0), model.row_wrap_delay(&grid, 3000.0));
        assert_eq!(model.move_delay(&grid, 3, 3000.0), model.step_delay(&grid, 3000.0));
    }

    #[test]
    fn test_settle_delay_override() {
        let model = TimingModel::default();
        assert_eq!(
            model.probe_settle_delay(FirmwareDialect::Legacy),
            FirmwareDialect::Legacy.default_settle_delay()
        );

        let config = TimingConfig {
            probe_settle: Some(Duration::from_millis(750)),
            ..TimingConfig::default()
        };
        let model = TimingModel::new(config).unwrap();
        assert_eq!(
            model.probe_settle_delay(FirmwareDialect::ModernMarlin),
            Duration::from_millis(750)
        );
    }

    #[test]
    fn test_validate_rejects_inverted_factors() {
        let config = TimingConfig {
            travel_factor: 100.0,
            step_factor: 120.0,
            ..TimingConfig::default()
        };
        assert!(matches!(TimingModel::new(config), Err(Error::Config(_))));

        let config = TimingConfig {
            step_factor: 0.0,
            ..TimingConfig::default()
        };
        assert!(TimingModel::new(config).is_err());
    }
}
