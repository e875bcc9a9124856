/*!
 * Daemon configuration, loaded from a TOML file
 */

use crate::error::{Result, VigilError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use vigil_armed::EvaluatorPolicy;
use vigil_camera::CameraConfig;
use vigil_events::{CameraOptions, OptionsChangedEvent};
use vigil_probe::ProbeConfig;

// Default value functions for serde
fn default_evaluator_interval() -> u64 {
    60
}

fn default_evaluator_initial_delay() -> u64 {
    10
}

fn default_health_check_interval() -> u64 {
    60
}

fn default_report_interval() -> u64 {
    3600
}

fn default_storage_directory() -> PathBuf {
    PathBuf::from("snapshots")
}

fn default_capture_duration() -> u64 {
    30
}

/// Complete daemon configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VigilConfig {
    #[serde(default)]
    pub system: SystemConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// Master devices: address -> display name
    #[serde(default)]
    pub masters: BTreeMap<String, String>,

    #[serde(default)]
    pub probe: ProbeConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub hooks: HooksConfig,

    #[serde(default)]
    pub cameras: Vec<CameraConfig>,
}

/// Global timings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_evaluator_interval")]
    pub evaluator_interval_secs: u64,

    #[serde(default = "default_evaluator_initial_delay")]
    pub evaluator_initial_delay_secs: u64,

    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    #[serde(default = "default_report_interval")]
    pub report_interval_secs: u64,

    /// Send the status report even while disarmed
    #[serde(default)]
    pub report_when_disarmed: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            evaluator_interval_secs: default_evaluator_interval(),
            evaluator_initial_delay_secs: default_evaluator_initial_delay(),
            health_check_interval_secs: default_health_check_interval(),
            report_interval_secs: default_report_interval(),
            report_when_disarmed: false,
        }
    }
}

impl SystemConfig {
    pub fn evaluator_policy(&self) -> EvaluatorPolicy {
        EvaluatorPolicy {
            interval_s: self.evaluator_interval_secs,
            initial_delay_s: self.evaluator_initial_delay_secs,
        }
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Local snapshot store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_directory")]
    pub directory: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: default_storage_directory(),
        }
    }
}

/// External capture command
///
/// `command` and `args` may contain `{camera}`, `{rtsp_url}`, `{mjpeg_url}`
/// and `{timestamp}`. With no command configured, captures only hold the lock
/// for `duration_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    #[serde(default)]
    pub command: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_capture_duration")]
    pub duration_secs: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            duration_secs: default_capture_duration(),
        }
    }
}

impl CaptureConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Shell commands run on lifecycle and arm-state changes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HooksConfig {
    #[serde(default)]
    pub on_arm: Vec<String>,

    #[serde(default)]
    pub on_disarm: Vec<String>,

    #[serde(default)]
    pub on_start: Vec<String>,

    #[serde(default)]
    pub on_stop: Vec<String>,
}

impl VigilConfig {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents).map_err(|source| VigilError::Toml {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse without validating
    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cameras.is_empty() {
            return Err(VigilError::Config(
                "at least one [[cameras]] entry is required".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for camera in &self.cameras {
            camera.validate()?;
            if !names.insert(camera.name.as_str()) {
                return Err(VigilError::Config(format!(
                    "duplicate camera name: {}",
                    camera.name
                )));
            }
        }

        self.system
            .evaluator_policy()
            .validate()
            .map_err(VigilError::Config)?;

        if self.system.health_check_interval_secs == 0 {
            return Err(VigilError::Config(
                "health_check_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.system.report_interval_secs == 0 {
            return Err(VigilError::Config(
                "report_interval_secs must be greater than 0".to_string(),
            ));
        }

        self.probe.validate()?;

        if self.storage.directory.as_os_str().is_empty() {
            return Err(VigilError::Config(
                "storage directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    pub fn camera(&self, name: &str) -> Option<&CameraConfig> {
        self.cameras.iter().find(|c| c.name == name)
    }

    /// Runtime options of every camera, as published on reload
    pub fn options_event(&self) -> OptionsChangedEvent {
        let cameras: HashMap<String, CameraOptions> = self
            .cameras
            .iter()
            .map(|c| (c.name.clone(), c.options()))
            .collect();
        OptionsChangedEvent::new(cameras)
    }
}
