/*!
 * Periodic status report
 */

use crate::notify::Notifier;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use vigil_armed::ArmedStateService;
use vigil_camera::CameraController;
use vigil_events::ArmMode;
use vigil_probe::{MasterState, PresenceMonitor};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CameraStatus {
    pub name: String,
    pub detector_enabled: bool,
    pub recording: bool,
    pub reboot_in_progress: bool,
    pub continuous: bool,
}

/// Point-in-time summary of the whole system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusReport {
    pub generated_at: DateTime<Utc>,
    pub uptime_secs: u64,
    pub mode: ArmMode,
    pub armed: bool,
    pub cameras: Vec<CameraStatus>,
    pub masters: Vec<MasterState>,
}

impl StatusReport {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Multi-line human readable form
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Vigil status: {} ({}), up {}",
            if self.armed { "ARMED" } else { "DISARMED" },
            self.mode,
            format_uptime(self.uptime_secs)
        );

        for camera in &self.cameras {
            let mut flags = Vec::new();
            if camera.detector_enabled {
                flags.push("detecting");
            }
            if camera.continuous {
                flags.push("continuous");
            }
            if camera.recording {
                flags.push("recording");
            }
            if camera.reboot_in_progress {
                flags.push("rebooting");
            }
            if flags.is_empty() {
                flags.push("idle");
            }
            let _ = write!(out, "\n  camera {}: {}", camera.name, flags.join(", "));
        }

        for master in &self.masters {
            let _ = write!(
                out,
                "\n  master {} ({}): {}",
                master.name, master.address, master.state
            );
        }

        out
    }
}

fn format_uptime(secs: u64) -> String {
    let days = secs / 86_400;
    let hours = (secs % 86_400) / 3600;
    let minutes = (secs % 3600) / 60;
    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m {}s", minutes, secs % 60)
    }
}

/// Builds and sends [`StatusReport`]s
pub struct StatusReporter {
    armed: Arc<ArmedStateService>,
    cameras: Vec<Arc<CameraController>>,
    presence: Arc<PresenceMonitor>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    report_when_disarmed: bool,
    started: Instant,
}

impl StatusReporter {
    pub fn new(
        armed: Arc<ArmedStateService>,
        cameras: Vec<Arc<CameraController>>,
        presence: Arc<PresenceMonitor>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
        report_when_disarmed: bool,
    ) -> Self {
        Self {
            armed,
            cameras,
            presence,
            notifier,
            interval,
            report_when_disarmed,
            started: Instant::now(),
        }
    }

    pub async fn build(&self) -> StatusReport {
        let armed = self.armed.snapshot().await;
        let cameras = self
            .cameras
            .iter()
            .map(|c| CameraStatus {
                name: c.name().to_string(),
                detector_enabled: c.is_detector_enabled(),
                recording: c.is_recording_in_progress(),
                reboot_in_progress: c.is_reboot_in_progress(),
                continuous: c.is_continuous(),
            })
            .collect();

        StatusReport {
            generated_at: Utc::now(),
            uptime_secs: self.started.elapsed().as_secs(),
            mode: armed.mode,
            armed: armed.armed,
            cameras,
            masters: self.presence.states().await,
        }
    }

    /// Send a report if the arm state calls for one
    pub async fn tick(&self) -> Option<StatusReport> {
        if !self.report_when_disarmed && !self.armed.is_armed().await {
            debug!("Disarmed, skipping status report");
            return None;
        }

        let report = self.build().await;
        if let Err(e) = self.notifier.status(&report).await {
            error!(error = %e, "Failed to deliver status report");
        }
        Some(report)
    }

    pub async fn run(self: Arc<Self>, shutdown: CancellationToken) {
        info!(interval_s = self.interval.as_secs(), "Status reports active");

        let mut interval = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }

        debug!("Status reports stopped");
    }
}
