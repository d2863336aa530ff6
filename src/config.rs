//! Configuration loading using Figment
//!
//! Configuration is layered, later sources win:
//! 1. built-in defaults ([`AppConfig::default`])
//! 2. `config/k2600.toml` (or the file given on the command line)
//! 3. environment variables prefixed with `K2600_`, nested keys separated by
//!    a double underscore
//!
//! # Example
//! ```no_run
//! use k2600_probecard::config::AppConfig;
//!
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("Instrument: {}", config.instrument.resource);
//! # Ok::<(), k2600_probecard::error::SmuError>(())
//! ```
//!
//! `K2600_INSTRUMENT__RESOURCE=GPIB0::26::INSTR` overrides `instrument.resource`.

use crate::error::{SmuError, SmuResult};
use crate::logging;
use crate::probecard::ProbeCardParams;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/k2600.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Instrument connection
    pub instrument: InstrumentConfig,
    /// Probe-card test settings and thresholds
    pub probecard: ProbeCardConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Also append logs to this file
    #[serde(default)]
    pub log_file: Option<PathBuf>,
    /// Rotate the log file past this size in bytes
    #[serde(default = "default_log_max_bytes")]
    pub log_max_bytes: u64,
    /// Rotated log files to keep
    #[serde(default = "default_log_backups")]
    pub log_backups: usize,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::default(),
            log_file: None,
            log_max_bytes: default_log_max_bytes(),
            log_backups: default_log_backups(),
        }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Multi-line, colored
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON
    Json,
}

/// Which session adapter to open the instrument with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// VISA library (needs the `instrument_visa` feature)
    #[default]
    Visa,
    /// In-process simulator
    Simulated,
}

/// Instrument connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentConfig {
    /// VISA resource string (e.g. "GPIB0::26::INSTR")
    pub resource: String,
    /// Session adapter
    #[serde(default)]
    pub transport: Transport,
    /// Open and I/O timeout (e.g. "5s", "2500ms")
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
    /// Terminator appended to every command
    #[serde(default = "default_line_terminator")]
    pub line_terminator: String,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            resource: "GPIB0::26::INSTR".to_string(),
            transport: Transport::default(),
            timeout: default_timeout(),
            line_terminator: default_line_terminator(),
        }
    }
}

/// Probe-card settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeCardConfig {
    /// Log raw readings and the pass vector
    #[serde(default)]
    pub verbose: bool,
    /// Source settings and thresholds
    #[serde(flatten)]
    pub params: ProbeCardParams,
}

impl Default for ProbeCardConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            params: ProbeCardParams {
                limit_a: 0.1,
                limit_b: 0.1,
                range: 6.0,
                level: 5.0,
                avdd_voltage_threshold: 4.8,
                avdd_current_threshold: 0.0,
                vdd_voltage_threshold: 4.8,
                vdd_current_threshold: 0.0,
            },
        }
    }
}

// Default value functions
fn default_log_max_bytes() -> u64 {
    logging::DEFAULT_LOG_MAX_BYTES
}

fn default_log_backups() -> usize {
    logging::DEFAULT_LOG_BACKUPS
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_line_terminator() -> String {
    "\n".to_string()
}

impl AppConfig {
    /// Load configuration from `config/k2600.toml` and environment variables
    pub fn load() -> SmuResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path. A missing file is not an
    /// error; defaults and the environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> SmuResult<Self> {
        Ok(Self::figment(path).extract()?)
    }

    fn figment<P: AsRef<Path>>(path: P) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("K2600_").split("__"))
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> SmuResult<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(SmuError::Validation(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        if self.application.log_max_bytes == 0 || self.application.log_backups == 0 {
            return Err(SmuError::Validation(
                "application.log_max_bytes and application.log_backups must be greater than zero"
                    .to_string(),
            ));
        }

        if self.instrument.resource.trim().is_empty() {
            return Err(SmuError::Validation(
                "instrument.resource must not be empty".to_string(),
            ));
        }

        if self.instrument.timeout.is_zero() {
            return Err(SmuError::Validation(
                "instrument.timeout must be greater than zero".to_string(),
            ));
        }

        let p = &self.probecard.params;
        for (name, value) in [
            ("limit_a", p.limit_a),
            ("limit_b", p.limit_b),
            ("range", p.range),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(SmuError::Validation(format!(
                    "probecard.{name} must be a positive number, got {value}"
                )));
            }
        }

        if !p.level.is_finite() || p.level.abs() > p.range {
            return Err(SmuError::Validation(format!(
                "probecard.level {} does not fit in range {}",
                p.level, p.range
            )));
        }

        for (name, value) in [
            ("avdd_voltage_threshold", p.avdd_voltage_threshold),
            ("avdd_current_threshold", p.avdd_current_threshold),
            ("vdd_voltage_threshold", p.vdd_voltage_threshold),
            ("vdd_current_threshold", p.vdd_current_threshold),
        ] {
            if !value.is_finite() {
                return Err(SmuError::Validation(format!(
                    "probecard.{name} must be finite, got {value}"
                )));
            }
        }

        Ok(())
    }
}
