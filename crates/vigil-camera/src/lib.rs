//! Vigil Camera: per-camera motion-detection lifecycle
//!
//! A [`CameraController`] owns everything that changes for one camera at
//! runtime: whether its detector runs, whether a capture is active and
//! whether a reboot is pending. It reacts to bus events and drives its
//! collaborators through the traits in [`collaborators`].
//!
//! # Capture deduplication
//!
//! Each camera has one [`CaptureLock`]. A motion detection only becomes a
//! notification and a capture if it wins the lock; detections arriving while
//! a capture runs are dropped, since the recording already covers them.

pub mod collaborators;
pub mod config;
pub mod controller;
pub mod detector;
pub mod error;
pub mod handle;
pub mod lifecycle;
pub mod lock;
pub mod reboot;
pub mod testing;

pub use collaborators::{CaptureTrigger, DetectorFactory, MotionDetector, ObjectStore};
pub use config::{CameraConfig, CameraUrls};
pub use controller::{CameraController, ControllerDeps, MotionOutcome};
pub use detector::{
    FrameAnalyzer, FrameSource, HttpFrameSource, Motion, PollingDetector, PollingDetectorFactory,
    SizeDeltaAnalyzer,
};
pub use error::CameraError;
pub use handle::CameraHandle;
pub use lifecycle::DetectorState;
pub use lock::CaptureLock;
pub use reboot::RebootClient;
