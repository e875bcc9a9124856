//! Camera controller behaviour against in-memory collaborators
//!
//! Covers capture deduplication, the continuous-monitoring exemption,
//! options-driven enable, liveness gating and reboot bookkeeping.

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use vigil_camera::testing::{FakeDetectorFactory, MemoryStore, RecordingCapture};
use vigil_camera::{
    CameraConfig, CameraController, ControllerDeps, DetectorState, MotionOutcome, RebootClient,
};
use vigil_events::{
    ArmMode, ArmState, ArmedEvent, CameraOptions, CameraRebootEvent, Event, EventBus,
    EventHandler, EventKind, HandlerError, MotionDetectedEvent, MotionToNotifyEvent,
    OptionsChangedEvent,
};
use vigil_probe::testing::StaticProbe;
use vigil_probe::IpState;

struct NotifyRecorder {
    seen: Mutex<Vec<MotionToNotifyEvent>>,
}

#[async_trait]
impl EventHandler for NotifyRecorder {
    fn name(&self) -> &str {
        "notify-recorder"
    }

    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        if let Event::MotionToNotify(e) = event {
            self.seen.lock().unwrap().push(e.clone());
        }
        Ok(())
    }
}

struct Fixture {
    bus: EventBus,
    probe: Arc<StaticProbe>,
    detectors: Arc<FakeDetectorFactory>,
    storage: Arc<MemoryStore>,
    capture: Arc<RecordingCapture>,
    notified: Arc<NotifyRecorder>,
}

impl Fixture {
    fn new() -> Self {
        let bus = EventBus::new();
        let notified = Arc::new(NotifyRecorder {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe(&[EventKind::MotionToNotify], notified.clone())
            .unwrap();

        Self {
            bus,
            probe: Arc::new(StaticProbe::new(IpState::Online)),
            detectors: Arc::new(FakeDetectorFactory::new()),
            storage: Arc::new(MemoryStore::new()),
            capture: Arc::new(RecordingCapture::new()),
            notified,
        }
    }

    fn controller(&self, config: CameraConfig) -> Arc<CameraController> {
        let deps = ControllerDeps {
            probe: self.probe.clone(),
            detectors: self.detectors.clone(),
            storage: self.storage.clone(),
            capture: self.capture.clone(),
        };
        let reboot = RebootClient::new().unwrap();
        Arc::new(CameraController::new(config, deps, self.bus.clone(), reboot).unwrap())
    }

    fn subscribed(&self, config: CameraConfig) -> Arc<CameraController> {
        let controller = self.controller(config);
        self.bus
            .subscribe(&CameraController::SUBSCRIBED_KINDS, controller.clone())
            .unwrap();
        controller
    }

    fn notified(&self) -> Vec<MotionToNotifyEvent> {
        self.notified.seen.lock().unwrap().clone()
    }
}

fn front_door() -> CameraConfig {
    CameraConfig::new("front-door", "192.168.1.50")
}

fn motion(camera: &str, event_id: &str) -> MotionDetectedEvent {
    MotionDetectedEvent {
        camera_name: camera.to_string(),
        image: Bytes::from_static(b"\xff\xd8jpeg"),
        motion_region: None,
        motion_area: 42.0,
        event_id: event_id.to_string(),
        detected_at: Utc::now(),
    }
}

fn options(continuous: bool) -> OptionsChangedEvent {
    let mut event = OptionsChangedEvent::default();
    event.cameras.insert(
        "front-door".to_string(),
        CameraOptions {
            continuous_monitoring: continuous,
            ..Default::default()
        },
    );
    event
}

#[tokio::test]
async fn test_concurrent_motion_yields_single_notification() {
    let fx = Fixture::new();
    fx.storage.set_delay(Duration::from_millis(50));
    let controller = fx.controller(front_door());

    let first = motion("front-door", "evt-1");
    let second = motion("front-door", "evt-2");
    let (a, b) = tokio::join!(
        controller.handle_motion(&first),
        controller.handle_motion(&second)
    );
    fx.bus.wait_idle().await;

    let mut outcomes = [a, b];
    outcomes.sort_by_key(|o| *o == MotionOutcome::Suppressed);
    assert_eq!(outcomes, [MotionOutcome::Captured, MotionOutcome::Suppressed]);

    assert_eq!(fx.notified().len(), 1);
    assert_eq!(fx.capture.started(), vec!["front-door".to_string()]);
    assert_eq!(fx.storage.len(), 1);
    assert!(controller.is_recording_in_progress());
}

#[tokio::test]
async fn test_motion_after_capture_finishes_is_captured_again() {
    let fx = Fixture::new();
    let controller = fx.controller(front_door());

    assert_eq!(
        controller.handle_motion(&motion("front-door", "evt-1")).await,
        MotionOutcome::Captured
    );
    assert_eq!(
        controller.handle_motion(&motion("front-door", "evt-2")).await,
        MotionOutcome::Suppressed
    );

    controller.handle().finish_capture();
    assert!(!controller.is_recording_in_progress());

    assert_eq!(
        controller.handle_motion(&motion("front-door", "evt-3")).await,
        MotionOutcome::Captured
    );
    fx.bus.wait_idle().await;

    let ids: Vec<_> = fx.notified().into_iter().map(|e| e.event_id).collect();
    assert_eq!(ids, vec!["evt-1".to_string(), "evt-3".to_string()]);
}

#[tokio::test]
async fn test_motion_for_other_camera_is_ignored() {
    let fx = Fixture::new();
    let controller = fx.subscribed(front_door());

    fx.bus.publish(motion("garage", "evt-1"));
    fx.bus.wait_idle().await;

    assert!(fx.notified().is_empty());
    assert!(!controller.is_recording_in_progress());
}

#[tokio::test]
async fn test_upload_failure_still_notifies_without_snapshot() {
    let fx = Fixture::new();
    fx.storage.set_fail(true);
    let controller = fx.subscribed(front_door());

    fx.bus.publish(motion("front-door", "evt-1"));
    fx.bus.wait_idle().await;

    let notified = fx.notified();
    assert_eq!(notified.len(), 1);
    assert!(notified[0].snapshot_url.is_none());
    assert!(controller.is_recording_in_progress());
    assert_eq!(fx.capture.started().len(), 1);
}

#[tokio::test]
async fn test_snapshot_stored_under_event_id() {
    let fx = Fixture::new();
    fx.subscribed(front_door());

    fx.bus.publish(motion("front-door", "evt-9"));
    fx.bus.wait_idle().await;

    let (mime, bytes) = fx.storage.get("evt-9.jpg").unwrap();
    assert_eq!(mime, "image/jpeg");
    assert_eq!(&bytes[..], b"\xff\xd8jpeg");
    assert_eq!(
        fx.notified()[0].snapshot_url.as_deref(),
        Some("memory://evt-9.jpg")
    );
}

#[tokio::test]
async fn test_capture_failure_releases_lock() {
    let fx = Fixture::new();
    fx.capture.set_fail(true);
    let controller = fx.controller(front_door());

    assert_eq!(
        controller.handle_motion(&motion("front-door", "evt-1")).await,
        MotionOutcome::CaptureFailed
    );
    assert!(!controller.is_recording_in_progress());
}

#[tokio::test]
async fn test_continuous_camera_is_never_disabled() {
    let fx = Fixture::new();
    let config = CameraConfig {
        continuous_monitoring: true,
        ..front_door()
    };
    let controller = fx.subscribed(config);

    assert!(controller.enable_motion_detection().await.unwrap());
    assert!(!controller.disable_motion_detection().await);
    assert!(controller.is_detector_enabled());

    fx.bus
        .publish(ArmedEvent::new(ArmMode::Manual, ArmState::Disarmed));
    fx.bus.wait_idle().await;

    assert!(controller.is_detector_enabled());
    assert_eq!(fx.detectors.active(), 1);
}

#[tokio::test]
async fn test_disable_releases_detector_and_capture_lock() {
    let fx = Fixture::new();
    let controller = fx.controller(front_door());

    controller.enable_motion_detection().await.unwrap();
    controller.handle_motion(&motion("front-door", "evt-1")).await;
    assert!(controller.is_recording_in_progress());

    assert!(controller.disable_motion_detection().await);
    assert!(!controller.is_detector_enabled());
    assert!(!controller.is_recording_in_progress());
    assert_eq!(controller.detector_state(), DetectorState::Disabled);
    assert_eq!(fx.detectors.active(), 0);

    assert!(!controller.disable_motion_detection().await);
}

#[tokio::test]
async fn test_armed_events_drive_detection() {
    let fx = Fixture::new();
    let controller = fx.subscribed(front_door());

    fx.bus
        .publish(ArmedEvent::new(ArmMode::Automatic, ArmState::Armed));
    fx.bus.wait_idle().await;
    assert!(controller.is_detector_enabled());

    fx.bus
        .publish(ArmedEvent::new(ArmMode::Automatic, ArmState::Armed));
    fx.bus
        .publish(ArmedEvent::new(ArmMode::Automatic, ArmState::Auto));
    fx.bus.wait_idle().await;
    assert_eq!(fx.detectors.created(), 1);

    fx.bus
        .publish(ArmedEvent::new(ArmMode::Automatic, ArmState::Disarmed));
    fx.bus.wait_idle().await;
    assert!(!controller.is_detector_enabled());
    assert_eq!(fx.detectors.active(), 0);
}

#[tokio::test]
async fn test_options_enable_once_and_idempotent() {
    let fx = Fixture::new();
    let controller = fx.subscribed(front_door());

    for _ in 0..3 {
        fx.bus.publish(options(true));
    }
    fx.bus.wait_idle().await;

    assert!(controller.is_detector_enabled());
    assert!(controller.is_continuous());
    assert_eq!(fx.detectors.created(), 1);
    assert_eq!(fx.detectors.active(), 1);
}

#[tokio::test]
async fn test_options_never_disable() {
    let fx = Fixture::new();
    let controller = fx.subscribed(CameraConfig {
        continuous_monitoring: true,
        ..front_door()
    });
    controller.enable_motion_detection().await.unwrap();

    fx.bus.publish(options(false));
    fx.bus.wait_idle().await;

    assert!(controller.is_detector_enabled());
    assert!(!controller.is_continuous());

    assert!(controller.disable_motion_detection().await);
}

#[tokio::test]
async fn test_offline_camera_is_not_enabled() {
    let fx = Fixture::new();
    fx.probe.set("192.168.1.50", IpState::Offline);
    let controller = fx.controller(front_door());

    assert!(!controller.enable_motion_detection().await.unwrap());
    assert!(!controller.is_detector_enabled());
    assert_eq!(controller.detector_state(), DetectorState::Disabled);
    assert_eq!(fx.detectors.created(), 0);

    fx.probe.set("192.168.1.50", IpState::Online);
    assert!(controller.enable_motion_detection().await.unwrap());
    assert_eq!(fx.probe.calls(), 2);
}

#[tokio::test]
async fn test_detector_start_failure_leaves_camera_disabled() {
    let fx = Fixture::new();
    fx.detectors.set_fail_start(true);
    let controller = fx.controller(front_door());

    assert!(controller.enable_motion_detection().await.is_err());
    assert!(!controller.is_detector_enabled());
    assert_eq!(controller.detector_state(), DetectorState::Disabled);
}

#[tokio::test]
async fn test_failed_reboot_stays_in_progress() {
    let fx = Fixture::new();
    let controller = fx.subscribed(CameraConfig {
        reboot_url_template: Some("http://127.0.0.1:1/reboot?user=${login}".to_string()),
        reboot_timeout_secs: 2,
        ..front_door()
    });

    assert!(controller.perform_reboot().await.is_err());
    assert!(controller.is_reboot_in_progress());
    let started = controller.reboot_started_at().unwrap();

    // A second request while pending is dropped
    fx.bus.publish(CameraRebootEvent::new("front-door"));
    fx.bus.wait_idle().await;
    assert_eq!(controller.reboot_started_at(), Some(started));

    assert!(controller.reboot_complete());
    assert!(!controller.is_reboot_in_progress());
    assert!(!controller.reboot_complete());
}

#[tokio::test]
async fn test_reboot_without_url_is_rejected() {
    let fx = Fixture::new();
    let controller = fx.controller(front_door());

    assert!(controller.perform_reboot().await.is_err());
    assert!(!controller.is_reboot_in_progress());
}
