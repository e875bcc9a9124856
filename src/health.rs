/*!
 * Periodic camera liveness sweep
 *
 * Cameras with `health_check_enabled` are probed on every sweep. An
 * unreachable camera gets a reboot request on the bus; a camera already
 * rebooting is watched until it answers again or its reboot timeout runs out.
 * Cameras without a reboot endpoint are only reported, once per outage.
 */

use futures::future::join_all;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vigil_camera::CameraController;
use vigil_events::{CameraRebootEvent, EventBus};

/// What one sweep did for one camera
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    Healthy,
    /// Unreachable; a reboot was requested
    RebootRequested,
    /// Rebooting and not back yet
    RebootPending,
    /// Back online after a reboot
    RebootConfirmed,
    /// Still unreachable after the reboot timeout; eligible for a new request
    RebootTimedOut,
    /// Unreachable with no reboot endpoint configured
    Unreachable,
}

pub struct HealthSweep {
    cameras: Vec<Arc<CameraController>>,
    bus: EventBus,
    interval: Duration,
    /// Cameras whose current outage was already reported
    reported_down: Mutex<HashSet<String>>,
}

impl HealthSweep {
    /// Only cameras with `health_check_enabled` are kept
    pub fn new(cameras: &[Arc<CameraController>], bus: EventBus, interval: Duration) -> Self {
        let cameras = cameras
            .iter()
            .filter(|c| c.config().health_check_enabled)
            .cloned()
            .collect();
        Self {
            cameras,
            bus,
            interval,
            reported_down: Mutex::new(HashSet::new()),
        }
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    /// Check every camera concurrently
    pub async fn sweep(&self) -> Vec<(String, HealthAction)> {
        join_all(self.cameras.iter().map(|camera| async move {
            (camera.name().to_string(), self.check(camera).await)
        }))
        .await
    }

    async fn check(&self, camera: &CameraController) -> HealthAction {
        let online = camera.is_online().await;

        if let Some(started) = camera.reboot_started_at() {
            if online {
                camera.reboot_complete();
                return HealthAction::RebootConfirmed;
            }

            let elapsed = started.elapsed();
            if elapsed >= camera.config().reboot_timeout() {
                error!(camera = %camera.name(), elapsed_s = elapsed.as_secs(), "Camera did not come back after reboot");
                camera.reboot_complete();
                return HealthAction::RebootTimedOut;
            }

            debug!(camera = %camera.name(), elapsed_s = elapsed.as_secs(), "Waiting for camera to reboot");
            return HealthAction::RebootPending;
        }

        let mut reported_down = self
            .reported_down
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if online {
            if reported_down.remove(camera.name()) {
                info!(camera = %camera.name(), "Camera reachable again");
            }
            return HealthAction::Healthy;
        }

        if camera.handle().urls.reboot.is_none() {
            if reported_down.insert(camera.name().to_string()) {
                warn!(camera = %camera.name(), ip = %camera.config().ip, "Camera unreachable and no reboot URL configured");
            }
            return HealthAction::Unreachable;
        }
        drop(reported_down);

        warn!(camera = %camera.name(), ip = %camera.config().ip, "Camera unreachable, requesting reboot");
        self.bus.publish(CameraRebootEvent::new(camera.name()));
        HealthAction::RebootRequested
    }

    /// Sweep every interval until `shutdown` is cancelled
    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        if self.cameras.is_empty() {
            debug!("No cameras with health checks, sweep idle");
            return;
        }

        info!(
            cameras = self.cameras.len(),
            interval_s = self.interval.as_secs(),
            "Health sweep active"
        );

        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.sweep().await;
                }
            }
        }

        info!("Health sweep stopped");
    }
}
