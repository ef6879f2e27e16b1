//! Grid scan over a borrowed serial connection.
//!
//! A [`ProbeSession`] walks the grid row by row (x outer, y inner). For every
//! cell it moves the head to the cell centre, waits for the move to finish,
//! then either probes the bed (`G30`) or reads back the position the firmware
//! settled at (`M114`), which exposes the leveling compensation applied there.
//!
//! ```text
//! Idle -> Homing -> Scanning(cell, Move -> Settle -> Probe -> Parse -> Record) -> Done
//!                                   \-------------- I/O error -----------------> Aborted
//! ```
//!
//! Replies that cannot be decoded do not stop the scan; the cell records 0.0
//! and is flagged so callers can tell it apart from a real reading. Transport
//! errors abort the whole scan.
//!
//! ## Example
//!
//! ```rust,no_run
//! use meshscan::{GridSpec, NativePort, ProbeSession, ScanConfig, ScanMode, SerialConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ScanConfig::default();
//!     let mut port = NativePort::open(&SerialConfig::new("/dev/ttyUSB0", 115200))?;
//!
//!     let mut session = ProbeSession::new(&mut port, &config)?;
//!     session.calibrate()?;
//!     let raw = session.run_scan(config.grid, ScanMode::RawHeight, |done, total| {
//!         println!("{done}/{total}");
//!     })?;
//!     println!("{} cells defaulted", raw.defaulted_cells().len());
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, trace, warn};

use crate::config::ScanConfig;
use crate::error::{Error, ParseError, Result};
use crate::grid::{CellStatus, GridSpec, Position, ScanResult};
use crate::port::Port;
use crate::protocol::{Calibration, Command, ProtocolCodec, Reading};
use crate::script::CommandScript;
use crate::timing::TimingModel;

/// What each cell of a pass measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    /// Probe the bed height.
    RawHeight,
    /// Read back the leveling compensation without probing.
    LevelingTaste,
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RawHeight => write!(f, "raw height"),
            Self::LevelingTaste => write!(f, "leveling taste"),
        }
    }
}

/// Sub-step of a single cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Sending the move to the cell centre.
    Move,
    /// Waiting for the head to arrive.
    Settle,
    /// Sending the probe or position query and waiting for the reply.
    Probe,
    /// Decoding the reply.
    Parse,
    /// Storing the value.
    Record,
}

/// Session progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No scan started yet.
    Idle,
    /// Moving to the grid origin.
    Homing,
    /// Working on cell `cell` (scan order index).
    Scanning {
        /// Scan order index of the cell.
        cell: usize,
        /// Current sub-step.
        step: ScanStep,
    },
    /// Last scan completed.
    Done,
    /// Last scan stopped on a transport error.
    Aborted,
}

/// Drives the firmware through one or more grid passes.
///
/// The session borrows the port, so the same open connection serves the
/// leveling pass, the raw pass and any startup or shutdown commands.
pub struct ProbeSession<'a, P: Port> {
    port: &'a mut P,
    config: &'a ScanConfig,
    codec: Box<dyn ProtocolCodec>,
    timing: TimingModel,
    calibration: Calibration,
    state: SessionState,
}

impl<'a, P: Port> ProbeSession<'a, P> {
    /// Create a session with the default calibration.
    ///
    /// The configuration is validated before the port is touched.
    pub fn new(port: &'a mut P, config: &'a ScanConfig) -> Result<Self> {
        Self::with_calibration(port, config, Calibration::default())
    }

    /// Create a session with a known calibration, skipping [`calibrate`](Self::calibrate).
    pub fn with_calibration(
        port: &'a mut P,
        config: &'a ScanConfig,
        calibration: Calibration,
    ) -> Result<Self> {
        config.validate()?;
        let timing = config.timing_model()?;
        Ok(Self {
            port,
            config,
            codec: config
                .dialect
                .codec(calibration),
            timing,
            calibration,
            state: SessionState::Idle,
        })
    }

    /// Current state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Calibration used to convert step counts.
    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    /// Codec for the configured dialect.
    pub fn codec(&self) -> &dyn ProtocolCodec {
        self.codec
            .as_ref()
    }

    /// Query the firmware for the probe-axis steps per millimetre.
    ///
    /// Only dialects reporting positions in steps need this; others keep the
    /// default without talking to the firmware. Must run before the first
    /// scan. An unreadable reply keeps the current calibration.
    pub fn calibrate(&mut self) -> Result<Calibration> {
        if self.state != SessionState::Idle {
            return Err(Error::Config(
                "calibration must happen before the first scan".into(),
            ));
        }
        if !self
            .config
            .dialect
            .reports_steps()
        {
            debug!("{} firmware reports millimetres, skipping calibration", self.config.dialect);
            return Ok(self.calibration);
        }

        let command = self
            .codec
            .encode_report_settings();
        let reply = self.exchange(&command, self.timing.query_delay())?;
        match self
            .codec
            .decode_steps_per_unit(&reply)
            .map_err(Error::from)
            .and_then(Calibration::new)
        {
            Ok(calibration) => {
                info!("Probe axis: {} steps/mm", calibration.steps_per_mm());
                self.calibration = calibration;
                self.codec = self
                    .config
                    .dialect
                    .codec(calibration);
            },
            Err(e) => {
                warn!(
                    "Could not read steps per mm ({e}), keeping {}",
                    self.calibration.steps_per_mm()
                );
            },
        }
        Ok(self.calibration)
    }

    /// Send every line of a command file, collecting and logging replies.
    pub fn send_commands(&mut self, script: &CommandScript) -> Result<()> {
        for command in script.commands() {
            check_interrupted()?;
            let reply = self.exchange(&command, Duration::ZERO)?;
            if !reply.is_empty() {
                debug!("{command} -> {}", String::from_utf8_lossy(&reply).trim_end());
            }
        }
        Ok(())
    }

    /// Scan every cell of `grid` in `mode`.
    ///
    /// `progress` receives (cells completed, total cells) after every cell.
    pub fn run_scan<F>(&mut self, grid: GridSpec, mode: ScanMode, mut progress: F) -> Result<ScanResult>
    where
        F: FnMut(usize, usize),
    {
        grid.validate()?;
        info!("Starting {mode} scan of {grid} on {}", self.port.name());

        let outcome = self.scan_cells(grid, mode, &mut progress);
        match &outcome {
            Ok(result) => {
                self.set_state(SessionState::Done);
                let defaulted = result
                    .defaulted_cells()
                    .len();
                if defaulted > 0 {
                    warn!("{mode} scan finished with {defaulted} defaulted cell(s)");
                } else {
                    info!("{mode} scan finished");
                }
            },
            Err(Error::Interrupted) => {
                self.set_state(SessionState::Aborted);
                warn!("{mode} scan interrupted");
            },
            Err(e) => {
                self.set_state(SessionState::Aborted);
                error!("{mode} scan on {} aborted: {e}", self.port.name());
            },
        }
        outcome
    }

    fn scan_cells<F>(&mut self, grid: GridSpec, mode: ScanMode, progress: &mut F) -> Result<ScanResult>
    where
        F: FnMut(usize, usize),
    {
        let feed = self.config.feed_rate;
        let clearance = self.config.clearance;
        let total = grid.cell_count();
        let mut result = ScanResult::new(grid);

        self.set_state(SessionState::Homing);
        self.move_to(Position::new(0.0, 0.0, clearance))?;
        self.wait(self.timing.homing_delay(&grid, feed));

        for row in 0..grid.rows() {
            for col in 0..grid.cols() {
                check_interrupted()?;
                let cell = row * grid.cols() + col;
                self.set_state(SessionState::Scanning {
                    cell,
                    step: ScanStep::Move,
                });
                let delay = self
                    .timing
                    .move_delay(&grid, col, feed);
                self.move_to(grid.cell_center(row, col, clearance))?;

                self.set_step(cell, ScanStep::Settle);
                self.wait(delay);

                let (value, status) = self.measure(cell, mode)?;
                if let CellStatus::Faulted(ref e) = status {
                    warn!("Cell ({row}, {col}): {e}; recording 0.0");
                }

                self.set_step(cell, ScanStep::Record);
                trace!("Cell ({row}, {col}) = {value} [{status}]");
                result.record(value, status);
                progress(cell + 1, total);
            }
        }

        Ok(result)
    }

    /// Probe or taste the current cell.
    fn measure(&mut self, cell: usize, mode: ScanMode) -> Result<(f64, CellStatus)> {
        match mode {
            ScanMode::LevelingTaste if !self.config.leveling => Ok((0.0, CellStatus::Skipped)),
            ScanMode::LevelingTaste => {
                self.set_step(cell, ScanStep::Probe);
                let command = self
                    .codec
                    .encode_report_position();
                let reply = self.exchange(&command, self.timing.query_delay())?;

                self.set_step(cell, ScanStep::Parse);
                Ok(recorded(
                    self.codec
                        .decode_position(&reply)
                        .map(Reading::Measured),
                ))
            },
            ScanMode::RawHeight => {
                self.set_step(cell, ScanStep::Probe);
                let command = self
                    .codec
                    .encode_probe();
                let settle = self
                    .timing
                    .probe_settle_delay(self.config.dialect);
                let reply = self.exchange(&command, settle)?;

                self.set_step(cell, ScanStep::Parse);
                Ok(recorded(
                    self.codec
                        .decode_probe_height(&reply),
                ))
            },
        }
    }

    /// Absolute move; positioning mode is re-asserted every time.
    fn move_to(&mut self, target: Position) -> Result<()> {
        let absolute = self
            .codec
            .encode_set_absolute();
        self.send_command(&absolute)?;
        let movement = self
            .codec
            .encode_move(target, self.config.feed_rate);
        self.send_command(&movement)
    }

    /// Send a command, wait, and collect the reply.
    fn exchange(&mut self, command: &Command, wait: Duration) -> Result<Vec<u8>> {
        // Drop acknowledgements of earlier moves so they are not parsed as
        // part of this reply.
        self.port
            .clear_buffers()?;
        self.send_command(command)?;
        self.wait(wait);

        let reply = self
            .port
            .read_available(self.timing.read_window())?;
        trace!("Received {} bytes: {:?}", reply.len(), String::from_utf8_lossy(&reply));
        if self.config.verbose > 0 {
            info!("{command} -> {}", String::from_utf8_lossy(&reply).trim_end());
        }
        Ok(reply)
    }

    /// Send a command frame.
    fn send_command(&mut self, command: &Command) -> Result<()> {
        debug!("Sending {command}");
        self.port
            .write_all_bytes(&command.build())
    }

    fn wait(&self, delay: Duration) {
        if !delay.is_zero() {
            trace!("Waiting {delay:?}");
            thread::sleep(delay);
        }
    }

    fn set_step(&mut self, cell: usize, step: ScanStep) {
        self.set_state(SessionState::Scanning { cell, step });
    }

    fn set_state(&mut self, state: SessionState) {
        trace!("Session state: {state:?}");
        self.state = state;
    }
}

fn check_interrupted() -> Result<()> {
    if crate::is_interrupted_requested() {
        return Err(Error::Interrupted);
    }
    Ok(())
}

/// Turn a decode outcome into a cell value and its status.
fn recorded(outcome: std::result::Result<Reading, ParseError>) -> (f64, CellStatus) {
    match outcome {
        Ok(Reading::Measured(value)) => (value, CellStatus::Measured),
        Ok(Reading::Assumed(value)) => (value, CellStatus::Assumed),
        Err(e) => (0.0, CellStatus::Faulted(e)),
    }
}
