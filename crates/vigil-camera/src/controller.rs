//! Camera Lifecycle Controller
//!
//! One controller per configured camera. It gates motion detection on
//! liveness, keeps at most one capture active for its camera and tracks
//! reboot bookkeeping. Everything it mutates is owned here; other components
//! reach it through bus events or the command/query methods below.
//!
//! Enable and disable serialize on the detector slot, so a burst of armed and
//! options events can never leave two detectors running for one camera.

use crate::collaborators::{CaptureTrigger, DetectorFactory, MotionDetector, ObjectStore};
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::handle::CameraHandle;
use crate::lifecycle::DetectorState;
use crate::reboot::RebootClient;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use vigil_events::{
    ArmState, ArmedEvent, CameraOptions, Event, EventBus, EventHandler, EventKind, HandlerError,
    MotionDetectedEvent, MotionToNotifyEvent,
};
use vigil_probe::LivenessProbe;

const SNAPSHOT_MIME: &str = "image/jpeg";

/// Collaborators shared by every controller
#[derive(Clone)]
pub struct ControllerDeps {
    pub probe: Arc<dyn LivenessProbe>,
    pub detectors: Arc<dyn DetectorFactory>,
    pub storage: Arc<dyn ObjectStore>,
    pub capture: Arc<dyn CaptureTrigger>,
}

/// What happened to one motion detection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionOutcome {
    /// The event was for another camera
    Ignored,
    /// A capture is already running for this camera
    Suppressed,
    /// Notification published and capture started
    Captured,
    /// Notification published but the capture trigger failed
    CaptureFailed,
}

pub struct CameraController {
    config: CameraConfig,
    handle: CameraHandle,
    deps: ControllerDeps,
    bus: EventBus,
    reboot_client: RebootClient,
    continuous: AtomicBool,
    detector_enabled: AtomicBool,
    detector: Mutex<Option<Box<dyn MotionDetector>>>,
    state: StdMutex<DetectorState>,
    reboot_started: StdMutex<Option<Instant>>,
}

fn lock<T>(mutex: &StdMutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CameraController {
    /// Event kinds a controller must be subscribed to
    pub const SUBSCRIBED_KINDS: [EventKind; 4] = [
        EventKind::Armed,
        EventKind::MotionDetected,
        EventKind::OptionsChanged,
        EventKind::CameraReboot,
    ];

    pub fn new(
        config: CameraConfig,
        deps: ControllerDeps,
        bus: EventBus,
        reboot_client: RebootClient,
    ) -> Result<Self, CameraError> {
        config.validate()?;

        let handle = CameraHandle::new(config.name.clone(), config.urls());
        let continuous = config.continuous_monitoring;

        Ok(Self {
            config,
            handle,
            deps,
            bus,
            reboot_client,
            continuous: AtomicBool::new(continuous),
            detector_enabled: AtomicBool::new(false),
            detector: Mutex::new(None),
            state: StdMutex::new(DetectorState::Disabled),
            reboot_started: StdMutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn handle(&self) -> &CameraHandle {
        &self.handle
    }

    /// Probe the camera now; never cached
    pub async fn is_online(&self) -> bool {
        self.deps.probe.probe(&self.config.ip).await.is_online()
    }

    pub fn is_detector_enabled(&self) -> bool {
        self.detector_enabled.load(Ordering::SeqCst)
    }

    pub fn is_recording_in_progress(&self) -> bool {
        self.handle.capture_lock().is_held()
    }

    pub fn is_reboot_in_progress(&self) -> bool {
        lock(&self.reboot_started).is_some()
    }

    /// When the current reboot was requested
    pub fn reboot_started_at(&self) -> Option<Instant> {
        *lock(&self.reboot_started)
    }

    pub fn detector_state(&self) -> DetectorState {
        *lock(&self.state)
    }

    pub fn is_continuous(&self) -> bool {
        self.continuous.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: DetectorState) {
        let mut state = lock(&self.state);
        if *state != next {
            debug!(camera = %self.config.name, from = state.as_str(), to = next.as_str(), "Detector state");
            *state = next;
        }
    }

    /// Start motion detection if the camera is reachable
    ///
    /// Returns whether a detector was started. Already enabled and offline
    /// cameras are no-ops.
    pub async fn enable_motion_detection(&self) -> Result<bool, CameraError> {
        let mut slot = self.detector.lock().await;
        if slot.is_some() {
            debug!(camera = %self.config.name, "Motion detection already enabled");
            return Ok(false);
        }

        self.set_state(DetectorState::Enabling);

        if !self.is_online().await {
            error!(camera = %self.config.name, ip = %self.config.ip, "Camera offline, cannot enable motion detection");
            self.set_state(DetectorState::Disabled);
            return Ok(false);
        }

        let mut detector = self
            .deps
            .detectors
            .create(&self.config, &self.handle, self.bus.clone());

        if let Err(e) = detector.start().await {
            self.set_state(DetectorState::Disabled);
            return Err(e);
        }

        *slot = Some(detector);
        self.detector_enabled.store(true, Ordering::SeqCst);
        self.set_state(DetectorState::Enabled);
        info!(camera = %self.config.name, "Motion detection enabled");
        Ok(true)
    }

    /// Stop motion detection unless the camera is continuous
    ///
    /// Returns whether a detector was stopped.
    pub async fn disable_motion_detection(&self) -> bool {
        if self.is_continuous() {
            info!(camera = %self.config.name, "Continuous monitoring, motion detection stays enabled");
            return false;
        }
        self.stop_detector().await
    }

    /// Tear down the detector regardless of continuous monitoring
    ///
    /// Used at shutdown. A detector that fails to stop is logged and dropped;
    /// local state is cleared either way.
    pub async fn stop_detector(&self) -> bool {
        let mut slot = self.detector.lock().await;
        let Some(mut detector) = slot.take() else {
            debug!(camera = %self.config.name, "Motion detection already disabled");
            return false;
        };

        self.set_state(DetectorState::Disabling);

        if let Err(e) = detector.stop().await {
            warn!(camera = %self.config.name, error = %e, "Detector did not stop cleanly");
        }
        drop(detector);

        self.detector_enabled.store(false, Ordering::SeqCst);
        if self.handle.capture_lock().release() {
            debug!(camera = %self.config.name, "Capture lock released on disable");
        }
        self.set_state(DetectorState::Disabled);
        info!(camera = %self.config.name, "Motion detection disabled");
        true
    }

    /// Turn a raw detection into at most one notification and one capture
    pub async fn handle_motion(&self, event: &MotionDetectedEvent) -> MotionOutcome {
        if event.camera_name != self.config.name {
            return MotionOutcome::Ignored;
        }

        let capture_lock = self.handle.capture_lock();
        if !capture_lock.try_acquire() {
            info!(camera = %self.config.name, event_id = %event.event_id, "Capture in progress, dropping motion event");
            return MotionOutcome::Suppressed;
        }

        let key = format!("{}.jpg", event.event_id);
        let snapshot_url = match self
            .deps
            .storage
            .put_object(&key, SNAPSHOT_MIME, event.image.clone())
            .await
        {
            Ok(url) => Some(url),
            Err(e) => {
                error!(camera = %self.config.name, event_id = %event.event_id, error = %e, "Snapshot upload failed");
                None
            }
        };

        self.bus
            .publish(MotionToNotifyEvent::from_detection(event, snapshot_url));

        match self.deps.capture.start_capture(&self.handle).await {
            Ok(()) => {
                info!(camera = %self.config.name, event_id = %event.event_id, area = event.motion_area, "Motion captured");
                MotionOutcome::Captured
            }
            Err(e) => {
                error!(camera = %self.config.name, event_id = %event.event_id, error = %e, "Capture failed to start");
                capture_lock.release();
                MotionOutcome::CaptureFailed
            }
        }
    }

    /// Apply runtime options for this camera
    ///
    /// Continuous monitoring switched on enables detection; switched off it
    /// only lifts the disable exemption.
    pub async fn apply_options(&self, options: &CameraOptions) -> Result<bool, CameraError> {
        let was = self
            .continuous
            .swap(options.continuous_monitoring, Ordering::SeqCst);
        if was != options.continuous_monitoring {
            info!(camera = %self.config.name, continuous = options.continuous_monitoring, "Continuous monitoring changed");
        }

        if options.continuous_monitoring && !self.is_detector_enabled() {
            return self.enable_motion_detection().await;
        }
        Ok(false)
    }

    /// Ask the camera to power-cycle
    ///
    /// Marks the reboot in progress before the request and leaves it set
    /// whatever the outcome; [`reboot_complete`](Self::reboot_complete) clears it.
    pub async fn perform_reboot(&self) -> Result<u16, CameraError> {
        let url = self
            .handle
            .urls
            .reboot
            .as_deref()
            .ok_or_else(|| CameraError::RebootNotConfigured(self.config.name.clone()))?;

        *lock(&self.reboot_started) = Some(Instant::now());
        info!(camera = %self.config.name, "Rebooting camera");

        match self
            .reboot_client
            .reboot(url, self.config.reboot_timeout())
            .await
        {
            Ok(status) if (200..300).contains(&status) => {
                info!(camera = %self.config.name, status, "Reboot request accepted");
                Ok(status)
            }
            Ok(status) => {
                warn!(camera = %self.config.name, status, "Reboot request returned non-success status");
                Ok(status)
            }
            Err(e) => {
                error!(camera = %self.config.name, error = %e, "Reboot request failed");
                Err(e)
            }
        }
    }

    /// Clear the reboot-in-progress flag; returns whether it was set
    pub fn reboot_complete(&self) -> bool {
        match lock(&self.reboot_started).take() {
            Some(started) => {
                info!(camera = %self.config.name, elapsed_s = started.elapsed().as_secs(), "Reboot complete");
                true
            }
            None => false,
        }
    }

    async fn on_armed(&self, event: &ArmedEvent) {
        let enabled = self.is_detector_enabled();

        match event.state {
            ArmState::Armed if !enabled => {
                if let Err(e) = self.enable_motion_detection().await {
                    error!(camera = %self.config.name, error = %e, "Failed to enable motion detection");
                }
            }
            ArmState::Disarmed if enabled && !self.is_continuous() => {
                self.disable_motion_detection().await;
            }
            state => {
                info!(camera = %self.config.name, %state, enabled, "Motion detection unchanged");
            }
        }
    }

    async fn on_reboot_request(&self) {
        if self.is_reboot_in_progress() {
            info!(camera = %self.config.name, "Reboot already in progress, ignoring request");
            return;
        }
        // Outcome already logged
        let _ = self.perform_reboot().await;
    }
}

#[async_trait]
impl EventHandler for CameraController {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        match event {
            Event::Armed(armed) => self.on_armed(armed).await,
            Event::MotionDetected(motion) => {
                self.handle_motion(motion).await;
            }
            Event::OptionsChanged(changed) => {
                if let Some(options) = changed.camera_options(&self.config.name) {
                    if let Err(e) = self.apply_options(options).await {
                        error!(camera = %self.config.name, error = %e, "Failed to apply options");
                    }
                }
            }
            Event::CameraReboot(reboot) if reboot.camera_name == self.config.name => {
                self.on_reboot_request().await;
            }
            Event::CameraReboot(_) | Event::MotionToNotify(_) => {}
        }
        Ok(())
    }
}
