//! Seams to the I/O-bound collaborators a camera controller drives
//!
//! The controller decides *when* these fire; the implementations decide *how*.

use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::handle::CameraHandle;
use async_trait::async_trait;
use bytes::Bytes;
use vigil_events::EventBus;

/// A running motion detector bound to one camera
///
/// Detectors publish `MotionDetectedEvent`s on the bus they were created with.
#[async_trait]
pub trait MotionDetector: Send {
    async fn start(&mut self) -> Result<(), CameraError>;

    /// Stop detecting; the next scheduled detection cycle must not run
    async fn stop(&mut self) -> Result<(), CameraError>;
}

/// Builds a fresh detector every time detection is enabled
pub trait DetectorFactory: Send + Sync {
    fn create(
        &self,
        config: &CameraConfig,
        camera: &CameraHandle,
        bus: EventBus,
    ) -> Box<dyn MotionDetector>;
}

/// Remote storage for motion snapshots
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `bytes` under `key` and return a locator for the stored object
    async fn put_object(&self, key: &str, mime_type: &str, bytes: Bytes)
        -> Result<String, CameraError>;
}

/// Starts a video capture for a camera
///
/// Fire-and-forget: the call returns once the capture is under way. The
/// implementation releases the capture lock through
/// [`CameraHandle::finish_capture`] when the recording ends.
#[async_trait]
pub trait CaptureTrigger: Send + Sync {
    async fn start_capture(&self, camera: &CameraHandle) -> Result<(), CameraError>;
}
