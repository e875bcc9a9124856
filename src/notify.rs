/*!
 * Notification fan-out
 *
 * The fan-out is the bus subscriber for confirmed motion and reboot requests.
 * Delivery itself sits behind [`Notifier`]; the default implementation writes
 * structured log lines.
 */

use crate::error::Result;
use crate::report::StatusReport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use vigil_events::{
    CameraRebootEvent, Event, EventHandler, EventKind, HandlerError, MotionToNotifyEvent,
};

/// Delivers notifications to people
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn motion(&self, event: &MotionToNotifyEvent) -> Result<()>;

    async fn reboot_requested(&self, event: &CameraRebootEvent) -> Result<()>;

    async fn status(&self, report: &StatusReport) -> Result<()>;
}

/// [`Notifier`] that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn motion(&self, event: &MotionToNotifyEvent) -> Result<()> {
        info!(
            camera = %event.camera_name,
            event_id = %event.event_id,
            area = event.motion_area,
            snapshot = event.snapshot_url.as_deref().unwrap_or("-"),
            detected_at = %event.detected_at,
            "Motion detected"
        );
        Ok(())
    }

    async fn reboot_requested(&self, event: &CameraRebootEvent) -> Result<()> {
        warn!(camera = %event.camera_name, "Camera unreachable, reboot requested");
        Ok(())
    }

    async fn status(&self, report: &StatusReport) -> Result<()> {
        info!("{}", report.summary());
        if let Ok(json) = report.to_json() {
            debug!(report = %json, "Status report");
        }
        Ok(())
    }
}

/// Bus subscriber routing notification events to a [`Notifier`]
pub struct NotificationFanout {
    notifier: Arc<dyn Notifier>,
}

impl NotificationFanout {
    pub const SUBSCRIBED_KINDS: [EventKind; 2] =
        [EventKind::MotionToNotify, EventKind::CameraReboot];

    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl EventHandler for NotificationFanout {
    fn name(&self) -> &str {
        "notification-fanout"
    }

    async fn handle(&self, event: &Event) -> std::result::Result<(), HandlerError> {
        let delivered = match event {
            Event::MotionToNotify(motion) => self.notifier.motion(motion).await,
            Event::CameraReboot(reboot) => self.notifier.reboot_requested(reboot).await,
            _ => Ok(()),
        };

        if let Err(e) = delivered {
            error!(kind = ?event.kind(), error = %e, "Notification delivery failed");
        }
        Ok(())
    }
}
