/*!
 * Error types for Vigil
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use vigil_camera::CameraError;
use vigil_probe::ProbeError;

pub type Result<T> = std::result::Result<T, VigilError>;

/// Exit code constants for structured process exit
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_FATAL: i32 = 2;

#[derive(Error, Debug)]
pub enum VigilError {
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to parse {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Camera(#[from] CameraError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// No camera with this name is configured
    #[error("Unknown camera: {0}")]
    UnknownCamera(String),
}

impl VigilError {
    /// Get the process exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            VigilError::Config(_) | VigilError::Toml { .. } | VigilError::Probe(_) => EXIT_FATAL,
            VigilError::Camera(CameraError::InvalidConfig { .. }) => EXIT_FATAL,
            _ => 1,
        }
    }
}
