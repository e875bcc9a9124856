//! Error types for camera control

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Invalid configuration for camera {camera}: {reason}")]
    InvalidConfig { camera: String, reason: String },

    #[error("Motion detector for camera {camera} failed to start: {reason}")]
    DetectorStart { camera: String, reason: String },

    #[error("Motion detector for camera {camera} failed to stop: {reason}")]
    DetectorStop { camera: String, reason: String },

    #[error("Camera {0} has no reboot URL configured")]
    RebootNotConfigured(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Capture error: {0}")]
    Capture(String),
}
