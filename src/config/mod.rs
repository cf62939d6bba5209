pub mod path;


use std::{io, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_EXPORT_LABEL, DEFAULT_REQUEST_TIMEOUT_SECS},
    device::{AccelerometerRange, Channel, FusionMode},
};

/// Represents all possible errors loading a [SessionConfig]
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Could not read: {0}")]
    IoError(#[from] io::Error),
    #[error("Unable to deserialize: {0}")]
    DeserializeError(#[from] serde_yaml::Error),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, f64),
}

/// Top-level session configuration
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct SessionConfig {
    /// Seconds to wait for a connection attempt before giving up
    pub connect_timeout_secs: f64,
    /// Seconds to wait for any other device request before giving up
    pub request_timeout_secs: f64,
    pub fusion_mode: FusionMode,
    /// Default output channel for sessions started without one
    pub channel: Channel,
    pub export: ExportConfig,
    pub simulator: SimulatorConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            fusion_mode: FusionMode::default(),
            channel: Channel::EulerAngle,
            export: ExportConfig::default(),
            simulator: SimulatorConfig::default(),
        }
    }
}

impl SessionConfig {
    /// Load a [SessionConfig] from the given YAML string
    pub fn from_yaml(content: String) -> Result<SessionConfig, LoadError> {
        let config: SessionConfig = serde_yaml::from_str(content.as_str())?;
        config.validate()?;
        Ok(config)
    }

    /// Load a [SessionConfig] from the given YAML file
    pub fn from_yaml_path(path: &Path) -> Result<SessionConfig, LoadError> {
        let file = std::fs::File::open(path)?;
        let config: SessionConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration from the given path, or from the first config
    /// file found in the search paths. Falls back to defaults when no file
    /// exists.
    pub fn load(path: Option<PathBuf>) -> Result<SessionConfig, LoadError> {
        if let Some(path) = path {
            return Self::from_yaml_path(&path);
        }
        let Some(path) = path::find_config_file() else {
            log::debug!("No config file found. Using defaults.");
            return Ok(SessionConfig::default());
        };
        log::debug!("Loading config from {path:?}");
        Self::from_yaml_path(&path)
    }

    /// Reject durations and rates that cannot be represented
    pub fn validate(&self) -> Result<(), LoadError> {
        check_seconds("connect_timeout_secs", self.connect_timeout_secs)?;
        check_seconds("request_timeout_secs", self.request_timeout_secs)?;
        check_rate("simulator.sample_rate_hz", self.simulator.sample_rate_hz)?;
        check_rate("simulator.log_rate_hz", self.simulator.log_rate_hz)?;
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        seconds_or(self.connect_timeout_secs, DEFAULT_CONNECT_TIMEOUT_SECS)
    }

    pub fn request_timeout(&self) -> Duration {
        seconds_or(self.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS)
    }
}

fn check_seconds(name: &'static str, value: f64) -> Result<(), LoadError> {
    match Duration::try_from_secs_f64(value) {
        Ok(_) => Ok(()),
        Err(_) => Err(LoadError::InvalidValue(name, value)),
    }
}

fn check_rate(name: &'static str, value: f64) -> Result<(), LoadError> {
    if value == 0.0 {
        return Ok(());
    }
    if !value.is_finite() || value < 0.0 {
        return Err(LoadError::InvalidValue(name, value));
    }
    // The period between samples must be representable as well
    check_seconds(name, 1.0 / value)
}

/// Convert seconds to a [Duration], using the fallback for values that
/// cannot be represented
fn seconds_or(value: f64, fallback: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_else(|_| {
        log::warn!("Invalid duration of {value} seconds, using {fallback}");
        Duration::from_secs_f64(fallback)
    })
}

/// Where and how collected samples are exported
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct ExportConfig {
    /// Prefix used for exported file names
    pub label: String,
    /// Directory exported files are written to. Defaults to the system
    /// temporary directory.
    pub directory: Option<PathBuf>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_EXPORT_LABEL.to_string(),
            directory: None,
        }
    }
}

impl ExportConfig {
    pub fn directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(std::env::temp_dir)
    }
}

/// Behavior of the simulated wearable
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct SimulatorConfig {
    /// Live notification rate. Zero disables generated samples.
    pub sample_rate_hz: f64,
    pub accelerometer_range: AccelerometerRange,
    pub battery: u8,
    pub temperature: f64,
    /// Milliseconds a connection attempt takes
    pub connect_delay_ms: u64,
    /// Number of samples the device holds in flash per second of logging
    pub log_rate_hz: f64,
    /// Number of progress updates reported while downloading a log
    pub download_steps: u32,
    pub faults: FaultPlan,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 50.0,
            accelerometer_range: AccelerometerRange::default(),
            battery: 87,
            temperature: 24.5,
            connect_delay_ms: 250,
            log_rate_hz: 50.0,
            download_steps: 10,
            faults: FaultPlan::default(),
        }
    }
}

/// Failures the simulated device injects
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct FaultPlan {
    pub fail_connect: bool,
    pub fail_disconnect: bool,
    pub fail_battery: bool,
    pub fail_temperature: bool,
    pub fail_stream_start: bool,
    /// Deliver a stream error after this many samples
    pub stream_error_after: Option<usize>,
    /// Keep delivering samples after notifications are stopped
    pub ignore_stop: bool,
    pub fail_log_start: bool,
    pub fail_download: bool,
    /// Never answer disconnect, fusion mode or stop notification requests
    pub stall_requests: bool,
}
