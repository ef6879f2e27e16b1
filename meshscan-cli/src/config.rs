//! Configuration file support for meshscan.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (MESHSCAN_*)
//! 3. Local config file (./meshscan.toml)
//! 4. Global config file (~/.config/meshscan/config.toml)

use crate::CliError;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::{debug, info, warn};
use meshscan::{FirmwareDialect, ScanConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Local configuration file name.
pub const LOCAL_CONFIG: &str = "meshscan.toml";

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Scan settings. Unset fields keep the library defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScanSection {
    /// Firmware dialect ("legacy" or "marlin").
    pub dialect: Option<String>,
    /// Extent along X in mm.
    pub x_extent: Option<f64>,
    /// Extent along Y in mm.
    pub y_extent: Option<f64>,
    /// Cell spacing in mm.
    pub spacing: Option<f64>,
    /// Feed rate in mm/min.
    pub feed_rate: Option<f64>,
    /// Run the leveling-compensation pass.
    pub leveling: Option<bool>,
    /// Head height during moves in mm.
    pub clearance: Option<f64>,
    /// Probe settle delay override in milliseconds.
    pub probe_settle_ms: Option<u64>,
    /// Timing factor for homing and row wraps.
    pub travel_factor: Option<f64>,
    /// Timing factor for in-row steps.
    pub step_factor: Option<f64>,
    /// Command file sent before scanning.
    pub startup: Option<PathBuf>,
    /// Command file sent after scanning.
    pub shutdown: Option<PathBuf>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection configuration.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Scan configuration.
    #[serde(default)]
    pub scan: ScanSection,
}

impl Config {
    /// Load configuration from all available sources.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Invalid TOML in config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "meshscan").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Store `port` as the preferred port in the config file at `path`.
    ///
    /// Other settings in an existing file are kept.
    pub fn save_port(path: &Path, port: &str) -> Result<()> {
        let mut config: Self = if path.exists() {
            toml::from_str(&fs::read_to_string(path)?)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?
        } else {
            Self::default()
        };
        config.connection.port = Some(port.to_string());

        fs::write(path, toml::to_string_pretty(&config)?)?;
        info!("Saved port {port} to {}", path.display());
        Ok(())
    }

    /// Merge another config into this one; set fields in `other` win.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.connection.port, other.connection.port);
        take(&mut self.connection.baud, other.connection.baud);

        let scan = &mut self.scan;
        take(&mut scan.dialect, other.scan.dialect);
        take(&mut scan.x_extent, other.scan.x_extent);
        take(&mut scan.y_extent, other.scan.y_extent);
        take(&mut scan.spacing, other.scan.spacing);
        take(&mut scan.feed_rate, other.scan.feed_rate);
        take(&mut scan.leveling, other.scan.leveling);
        take(&mut scan.clearance, other.scan.clearance);
        take(&mut scan.probe_settle_ms, other.scan.probe_settle_ms);
        take(&mut scan.travel_factor, other.scan.travel_factor);
        take(&mut scan.step_factor, other.scan.step_factor);
        take(&mut scan.startup, other.scan.startup);
        take(&mut scan.shutdown, other.scan.shutdown);
    }
}

impl ScanSection {
    /// Apply the configured fields on top of `base`.
    pub fn apply(&self, mut base: ScanConfig) -> Result<ScanConfig> {
        if let Some(name) = &self.dialect {
            base.dialect = parse_dialect(name)?;
        }

        let grid = &mut base.grid;
        if let Some(x) = self.x_extent {
            grid.x_extent = x;
        }
        if let Some(y) = self.y_extent {
            grid.y_extent = y;
        }
        if let Some(spacing) = self.spacing {
            grid.spacing = spacing;
        }

        if let Some(feed) = self.feed_rate {
            base.feed_rate = feed;
        }
        if let Some(leveling) = self.leveling {
            base.leveling = leveling;
        }
        if let Some(clearance) = self.clearance {
            base.clearance = clearance;
        }
        if let Some(ms) = self.probe_settle_ms {
            base.timing.probe_settle = Some(Duration::from_millis(ms));
        }
        if let Some(factor) = self.travel_factor {
            base.timing.travel_factor = factor;
        }
        if let Some(factor) = self.step_factor {
            base.timing.step_factor = factor;
        }

        Ok(base)
    }
}

/// Parse a dialect name from config or the command line.
pub fn parse_dialect(name: &str) -> Result<FirmwareDialect> {
    FirmwareDialect::from_name(name).ok_or_else(|| {
        CliError::Config(format!(
            "Unknown firmware dialect '{name}' (expected 'legacy' or 'marlin')"
        ))
        .into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.connection.port.is_none());
        assert!(config.connection.baud.is_none());
        assert!(config.scan.dialect.is_none());
        assert!(config.scan.startup.is_none());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
[connection]
port = "/dev/ttyUSB0"
baud = 250000

[scan]
dialect = "legacy"
x_extent = 200.0
y_extent = 180.0
spacing = 20.0
leveling = true
probe_settle_ms = 1500
startup = "start.gcode"
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(config.connection.baud, Some(250000));
        assert_eq!(config.scan.dialect.as_deref(), Some("legacy"));
        assert_eq!(config.scan.x_extent, Some(200.0));
        assert_eq!(config.scan.leveling, Some(true));
        assert_eq!(config.scan.startup, Some(PathBuf::from("start.gcode")));
        assert!(config.scan.shutdown.is_none());
    }

    #[test]
    fn test_config_from_empty_toml() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.connection.port.is_none());
        assert!(config.scan.spacing.is_none());
    }

    #[test]
    fn test_merge_overrides_only_set_fields() {
        let mut base = Config::default();
        base.connection.port = Some("/dev/ttyUSB0".to_string());
        base.connection.baud = Some(115200);
        base.scan.spacing = Some(25.0);

        let mut other = Config::default();
        other.connection.baud = Some(250000);
        other.scan.dialect = Some("marlin".to_string());

        base.merge(other);

        assert_eq!(base.connection.port.as_deref(), Some("/dev/ttyUSB0"));
        assert_eq!(base.connection.baud, Some(250000));
        assert_eq!(base.scan.spacing, Some(25.0));
        assert_eq!(base.scan.dialect.as_deref(), Some("marlin"));
    }

    #[test]
    fn test_apply_scan_section() {
        let section = ScanSection {
            dialect: Some("old".to_string()),
            spacing: Some(10.0),
            feed_rate: Some(1200.0),
            leveling: Some(true),
            probe_settle_ms: Some(500),
            ..ScanSection::default()
        };
        let config = section.apply(ScanConfig::default()).unwrap();

        assert_eq!(config.dialect, FirmwareDialect::Legacy);
        assert_eq!(config.grid.spacing, 10.0);
        assert_eq!(config.grid.x_extent, 150.0);
        assert_eq!(config.feed_rate, 1200.0);
        assert!(config.leveling);
        assert_eq!(config.timing.probe_settle, Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_apply_rejects_unknown_dialect() {
        let section = ScanSection {
            dialect: Some("klipper".to_string()),
            ..ScanSection::default()
        };
        assert!(section.apply(ScanConfig::default()).is_err());
    }

    #[test]
    fn test_load_from_path_valid() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("scan.toml");
        fs::write(&path, "[connection]\nport = \"/dev/ttyACM0\"\n[scan]\nclearance = 3.0\n").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.scan.clearance, Some(3.0));
    }

    #[test]
    fn test_load_from_path_invalid_falls_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "invalid toml [[[").unwrap();

        let config = Config::load_from_path(&path);
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_save_port_keeps_other_settings() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(LOCAL_CONFIG);
        fs::write(&path, "[scan]\nspacing = 15.0\n").unwrap();

        Config::save_port(&path, "/dev/ttyUSB2").unwrap();

        let config = Config::load_from_path(&path);
        assert_eq!(config.connection.port.as_deref(), Some("/dev/ttyUSB2"));
        assert_eq!(config.scan.spacing, Some(15.0));
    }

    #[test]
    fn test_load_from_path_nonexistent() {
        let config = Config::load_from_path(Path::new("/nonexistent/path/config.toml"));
        assert!(config.connection.port.is_none());
    }

    #[test]
    fn test_global_config_path() {
        if let Some(p) = Config::global_config_path() {
            let p = p.to_string_lossy();
            assert!(p.contains("meshscan"));
            assert!(p.ends_with("config.toml"));
        }
    }
}
