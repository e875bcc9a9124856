//! Event variants
//!
//! Every cross-component signal in Vigil is one variant of [`Event`]. Events are
//! immutable once published; the bus shares them between subscribers behind an
//! `Arc`, so payloads such as snapshot images are never copied per subscriber.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Whether arming decisions are made by the presence evaluator or by an operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArmMode {
    /// The periodic evaluator arms and disarms based on master presence
    Automatic,

    /// An operator override is in effect; the evaluator stays hands-off
    Manual,
}

impl ArmMode {
    /// String representation
    pub fn as_str(&self) -> &str {
        match self {
            ArmMode::Automatic => "AUTOMATIC",
            ArmMode::Manual => "MANUAL",
        }
    }
}

impl fmt::Display for ArmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Arm state carried by an [`ArmedEvent`]
///
/// `Auto` only ever appears in mode-change requests. The resting state of the
/// system is always `Armed` or `Disarmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArmState {
    /// The premises are guarded
    Armed,

    /// The premises are not guarded
    Disarmed,

    /// Hand control back to the automatic evaluator
    Auto,
}

impl ArmState {
    /// String representation
    pub fn as_str(&self) -> &str {
        match self {
            ArmState::Armed => "ARMED",
            ArmState::Disarmed => "DISARMED",
            ArmState::Auto => "AUTO",
        }
    }

    /// Resting state for a boolean armed flag
    pub fn from_armed(armed: bool) -> Self {
        if armed {
            ArmState::Armed
        } else {
            ArmState::Disarmed
        }
    }
}

impl fmt::Display for ArmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mode/state transition request or notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedEvent {
    pub mode: ArmMode,
    pub state: ArmState,
}

impl ArmedEvent {
    pub fn new(mode: ArmMode, state: ArmState) -> Self {
        Self { mode, state }
    }
}

/// Bounding box of the detected motion, in frame pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MotionRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Raw detector output for one camera
#[derive(Debug, Clone)]
pub struct MotionDetectedEvent {
    /// Camera that observed the motion
    pub camera_name: String,

    /// Encoded frame (JPEG) in which motion was observed
    pub image: Bytes,

    /// Where in the frame motion was found, if the detector can tell
    pub motion_region: Option<MotionRegion>,

    /// Size of the motion, in percent of the frame
    pub motion_area: f64,

    /// Unique id of this occurrence; reused as the snapshot object key
    pub event_id: String,

    pub detected_at: DateTime<Utc>,
}

/// Motion that passed capture deduplication and is ready for notification
#[derive(Debug, Clone)]
pub struct MotionToNotifyEvent {
    pub camera_name: String,
    pub image: Bytes,
    pub motion_region: Option<MotionRegion>,
    pub motion_area: f64,
    pub event_id: String,
    pub detected_at: DateTime<Utc>,

    /// Locator of the uploaded snapshot; `None` when the upload failed
    pub snapshot_url: Option<String>,
}

impl MotionToNotifyEvent {
    /// Enrich a raw detection with the snapshot locator
    pub fn from_detection(detected: &MotionDetectedEvent, snapshot_url: Option<String>) -> Self {
        Self {
            camera_name: detected.camera_name.clone(),
            image: detected.image.clone(),
            motion_region: detected.motion_region,
            motion_area: detected.motion_area,
            event_id: detected.event_id.clone(),
            detected_at: detected.detected_at,
            snapshot_url,
        }
    }
}

/// Runtime-adjustable options of a single camera
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraOptions {
    #[serde(default)]
    pub continuous_monitoring: bool,

    #[serde(default)]
    pub autostart_monitoring: bool,

    #[serde(default)]
    pub health_check_enabled: bool,
}

/// Runtime configuration update, keyed by camera name
#[derive(Debug, Clone, Default)]
pub struct OptionsChangedEvent {
    pub cameras: HashMap<String, CameraOptions>,
}

impl OptionsChangedEvent {
    pub fn new(cameras: HashMap<String, CameraOptions>) -> Self {
        Self { cameras }
    }

    /// Options for one camera, if the update mentions it
    pub fn camera_options(&self, camera_name: &str) -> Option<&CameraOptions> {
        self.cameras.get(camera_name)
    }
}

/// Request to power-cycle a camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraRebootEvent {
    pub camera_name: String,
}

impl CameraRebootEvent {
    pub fn new(camera_name: impl Into<String>) -> Self {
        Self {
            camera_name: camera_name.into(),
        }
    }
}

/// Closed set of everything that travels over the bus
#[derive(Debug, Clone)]
pub enum Event {
    Armed(ArmedEvent),
    MotionDetected(MotionDetectedEvent),
    MotionToNotify(MotionToNotifyEvent),
    OptionsChanged(OptionsChangedEvent),
    CameraReboot(CameraRebootEvent),
}

impl Event {
    /// Discriminant used for subscription filtering
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Armed(_) => EventKind::Armed,
            Event::MotionDetected(_) => EventKind::MotionDetected,
            Event::MotionToNotify(_) => EventKind::MotionToNotify,
            Event::OptionsChanged(_) => EventKind::OptionsChanged,
            Event::CameraReboot(_) => EventKind::CameraReboot,
        }
    }
}

/// Payload-free discriminant of [`Event`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Armed,
    MotionDetected,
    MotionToNotify,
    OptionsChanged,
    CameraReboot,
}

impl EventKind {
    /// Every kind, for subscribers that want the whole stream
    pub const ALL: [EventKind; 5] = [
        EventKind::Armed,
        EventKind::MotionDetected,
        EventKind::MotionToNotify,
        EventKind::OptionsChanged,
        EventKind::CameraReboot,
    ];
}

impl From<ArmedEvent> for Event {
    fn from(event: ArmedEvent) -> Self {
        Event::Armed(event)
    }
}

impl From<MotionDetectedEvent> for Event {
    fn from(event: MotionDetectedEvent) -> Self {
        Event::MotionDetected(event)
    }
}

impl From<MotionToNotifyEvent> for Event {
    fn from(event: MotionToNotifyEvent) -> Self {
        Event::MotionToNotify(event)
    }
}

impl From<OptionsChangedEvent> for Event {
    fn from(event: OptionsChangedEvent) -> Self {
        Event::OptionsChanged(event)
    }
}

impl From<CameraRebootEvent> for Event {
    fn from(event: CameraRebootEvent) -> Self {
        Event::CameraReboot(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        let event: Event = ArmedEvent::new(ArmMode::Manual, ArmState::Armed).into();
        assert_eq!(event.kind(), EventKind::Armed);

        let event: Event = CameraRebootEvent::new("porch").into();
        assert_eq!(event.kind(), EventKind::CameraReboot);
    }

    #[test]
    fn test_notify_keeps_detection_payload() {
        let detected = MotionDetectedEvent {
            camera_name: "porch".to_string(),
            image: Bytes::from_static(b"jpeg"),
            motion_region: Some(MotionRegion {
                x: 1,
                y: 2,
                width: 30,
                height: 40,
            }),
            motion_area: 27.5,
            event_id: "evt-1".to_string(),
            detected_at: Utc::now(),
        };

        let notify = MotionToNotifyEvent::from_detection(&detected, None);
        assert_eq!(notify.camera_name, "porch");
        assert_eq!(notify.event_id, "evt-1");
        assert_eq!(notify.motion_region, detected.motion_region);
        assert!(notify.snapshot_url.is_none());
    }

    #[test]
    fn test_arm_enums_use_uppercase_names() {
        assert_eq!(ArmMode::Automatic.to_string(), "AUTOMATIC");
        assert_eq!(ArmState::Auto.to_string(), "AUTO");
        assert_eq!(ArmState::from_armed(false), ArmState::Disarmed);
        assert_eq!(ArmState::from_armed(true), ArmState::Armed);
    }

    #[test]
    fn test_options_lookup_by_camera() {
        let mut cameras = HashMap::new();
        cameras.insert(
            "garage".to_string(),
            CameraOptions {
                continuous_monitoring: true,
                ..Default::default()
            },
        );
        let event = OptionsChangedEvent::new(cameras);

        assert!(event.camera_options("garage").unwrap().continuous_monitoring);
        assert!(event.camera_options("porch").is_none());
    }
}
