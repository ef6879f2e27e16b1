//! `scan` command: probe the bed and report its height map.

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::{info, warn};
use meshscan::{
    CommandScript, HeightMap, HeightMapBuilder, NativePort, Port, ProbeSession, ScanConfig,
    ScanMode, SerialConfig, port::DEFAULT_BAUD,
};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{Config, parse_dialect};
use crate::serial::{SerialOptions, ask_remember_port, select_serial_port};
use crate::{Cli, CliError, use_fancy_output};

/// Options of the `scan` command; unset values come from the config files.
#[derive(Args, Debug, Default)]
pub(crate) struct ScanArgs {
    /// Extent along X in mm.
    #[arg(long, value_name = "MM")]
    pub x_extent: Option<f64>,

    /// Extent along Y in mm.
    #[arg(long, value_name = "MM")]
    pub y_extent: Option<f64>,

    /// Distance between probe points in mm.
    #[arg(short, long, value_name = "MM")]
    pub spacing: Option<f64>,

    /// Feed rate for moves in mm/min.
    #[arg(short, long, value_name = "MM_PER_MIN")]
    pub feed_rate: Option<f64>,

    /// Head height during moves in mm.
    #[arg(long, value_name = "MM")]
    pub clearance: Option<f64>,

    /// Measure and subtract the firmware's leveling compensation.
    #[arg(short, long, conflicts_with = "no_leveling")]
    pub leveling: bool,

    /// Do not measure the leveling compensation, even if configured.
    #[arg(long)]
    pub no_leveling: bool,

    /// Wait after each probe in milliseconds (overrides the dialect default).
    #[arg(long, value_name = "MS")]
    pub settle_ms: Option<u64>,

    /// Command file sent before scanning.
    #[arg(long, value_name = "FILE")]
    pub startup: Option<PathBuf>,

    /// Command file sent after scanning.
    #[arg(long, value_name = "FILE")]
    pub shutdown: Option<PathBuf>,

    /// Print the result as JSON to stdout.
    #[arg(long)]
    pub json: bool,

    /// Also write the JSON result to a file.
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,
}

/// Closes the port on every exit path.
struct PortGuard(NativePort);

impl Drop for PortGuard {
    fn drop(&mut self) {
        if let Err(e) = self.0.close() {
            warn!("Failed to close port: {e}");
        }
    }
}

/// Resolve the scan configuration: config files, then flags.
pub(crate) fn resolve_scan_config(cli: &Cli, config: &Config, args: &ScanArgs) -> Result<ScanConfig> {
    let mut scan = config
        .scan
        .apply(ScanConfig::default())?;

    if let Some(name) = &cli.dialect {
        scan.dialect = parse_dialect(name)?;
    }
    if let Some(x) = args.x_extent {
        scan.grid.x_extent = x;
    }
    if let Some(y) = args.y_extent {
        scan.grid.y_extent = y;
    }
    if let Some(spacing) = args.spacing {
        scan.grid.spacing = spacing;
    }
    if let Some(feed) = args.feed_rate {
        scan.feed_rate = feed;
    }
    if let Some(clearance) = args.clearance {
        scan.clearance = clearance;
    }
    if args.leveling {
        scan.leveling = true;
    } else if args.no_leveling {
        scan.leveling = false;
    }
    if let Some(ms) = args.settle_ms {
        scan.timing.probe_settle = Some(Duration::from_millis(ms));
    }
    scan.verbose = cli.verbose;

    scan.validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(scan)
}

fn load_script(path: Option<&Path>) -> Result<Option<CommandScript>> {
    path.map(|p| {
        CommandScript::from_file(p)
            .with_context(|| format!("Failed to read command file {}", p.display()))
    })
    .transpose()
}

/// Scan command implementation.
pub(crate) fn cmd_scan(cli: &Cli, config: &Config, args: &ScanArgs) -> Result<()> {
    let scan = resolve_scan_config(cli, config, args)?;
    let startup = load_script(
        args.startup
            .as_deref()
            .or(config.scan.startup.as_deref()),
    )?;
    let shutdown = load_script(
        args.shutdown
            .as_deref()
            .or(config.scan.shutdown.as_deref()),
    )?;

    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };
    let selected = select_serial_port(&options, config)?;
    if !cli.non_interactive {
        ask_remember_port(&selected)?;
    }
    let baud = cli
        .baud
        .or(config.connection.baud)
        .unwrap_or(DEFAULT_BAUD);

    if !cli.quiet {
        eprintln!(
            "{} Using {} at {} baud ({} firmware)",
            style("🔌").cyan(),
            style(&selected.name).green(),
            baud,
            scan.dialect
        );
        eprintln!("{} Grid {}", style("ℹ").blue(), scan.grid);
    }

    let mut guard = PortGuard(
        NativePort::open_with_retry(&SerialConfig::new(&selected.name, baud))
            .with_context(|| format!("Failed to open {}", selected.name))?,
    );
    let mut session = ProbeSession::new(&mut guard.0, &scan)?;

    if let Some(script) = &startup {
        info!("Sending {} startup command(s)", script.len());
        session.send_commands(script)?;
    }

    let calibration = session.calibrate()?;

    let offset = if scan.leveling {
        Some(run_pass(cli, &mut session, &scan, ScanMode::LevelingTaste)?)
    } else {
        None
    };
    let raw = run_pass(cli, &mut session, &scan, ScanMode::RawHeight)?;

    if let Some(script) = &shutdown {
        info!("Sending {} shutdown command(s)", script.len());
        session.send_commands(script)?;
    }
    drop(session);
    drop(guard);

    let map = HeightMapBuilder::build(&raw, offset.as_ref())?;
    let document = json_document(&map, &scan, calibration.steps_per_mm());

    if let Some(path) = &args.output {
        fs::write(path, serde_json::to_string_pretty(&document)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Wrote height map to {}", path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&document)?);
    } else {
        print!("{map}");
    }
    report_summary(&map);

    Ok(())
}

fn run_pass(
    cli: &Cli,
    session: &mut ProbeSession<'_, NativePort>,
    scan: &ScanConfig,
    mode: ScanMode,
) -> Result<meshscan::ScanResult> {
    let total = scan.grid.cell_count();
    let pb = if cli.quiet || !use_fancy_output() {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new(total as u64);
        #[allow(clippy::unwrap_used)] // Static template string
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("#>-"),
        );
        pb.set_draw_target(ProgressDrawTarget::stderr());
        pb
    };
    pb.set_message(mode.to_string());

    let result = session.run_scan(scan.grid, mode, |done, _| pb.set_position(done as u64));
    match &result {
        Ok(_) => pb.finish_with_message(format!("{mode} done")),
        Err(_) => pb.abandon(),
    }
    Ok(result?)
}

fn json_document(map: &HeightMap, scan: &ScanConfig, steps_per_mm: f64) -> serde_json::Value {
    let heights: Vec<&[f64]> = map
        .rows()
        .collect();
    serde_json::json!({
        "dialect": scan.dialect,
        "grid": map.grid(),
        "shape": map.shape(),
        "steps_per_mm": steps_per_mm,
        "leveling_subtracted": scan.leveling,
        "range": map.range(),
        "heights": heights,
        "defaulted": map.defaulted_cells(),
    })
}

/// Flatness and defaulted cells; always printed so defaults are never silent.
fn report_summary(map: &HeightMap) {
    eprintln!(
        "\n{} Peak-to-valley: {:.3} mm",
        style("✓").green().bold(),
        map.range()
    );

    let defaulted = map.defaulted_cells();
    if defaulted.is_empty() {
        eprintln!("{} All cells measured", style("✓").green());
    } else {
        let cells: Vec<String> = defaulted
            .iter()
            .map(|(r, c)| format!("({r}, {c})"))
            .collect();
        eprintln!(
            "{} {} cell(s) hold 0.0 instead of a reading (marked *): {}",
            style("⚠").yellow(),
            defaulted.len(),
            cells.join(", ")
        );
    }
}
