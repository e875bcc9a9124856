//! Camera handle passed to collaborators

use crate::config::CameraUrls;
use crate::lock::CaptureLock;
use tracing::info;

/// What detectors and capture triggers need to know about a camera
///
/// Cloning is cheap and every clone shares the same capture lock, so a capture
/// collaborator can release it when its recording ends.
#[derive(Debug, Clone)]
pub struct CameraHandle {
    pub name: String,
    pub urls: CameraUrls,
    capture_lock: CaptureLock,
}

impl CameraHandle {
    pub fn new(name: impl Into<String>, urls: CameraUrls) -> Self {
        Self {
            name: name.into(),
            urls,
            capture_lock: CaptureLock::new(),
        }
    }

    pub fn capture_lock(&self) -> &CaptureLock {
        &self.capture_lock
    }

    /// Signal that the capture started for this camera has ended
    pub fn finish_capture(&self) {
        if self.capture_lock.release() {
            info!(camera = %self.name, "Capture finished, lock released");
        }
    }
}
