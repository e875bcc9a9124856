/*!
 * Video capture through an external command
 */

use crate::config::CaptureConfig;
use async_trait::async_trait;
use chrono::Utc;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};
use vigil_camera::{CameraError, CameraHandle, CaptureTrigger};

/// Extra time a capture command gets past `duration_secs` before it is killed
const CAPTURE_GRACE: Duration = Duration::from_secs(30);

/// [`CaptureTrigger`] that spawns the configured command
///
/// The capture lock is released when the command exits. Without a command
/// the lock is simply held for the capture duration, which still suppresses
/// duplicate notifications for the motion window.
#[derive(Debug, Clone)]
pub struct CommandCapture {
    config: CaptureConfig,
}

impl CommandCapture {
    pub fn new(config: CaptureConfig) -> Self {
        Self { config }
    }

    fn render(&self, template: &str, camera: &CameraHandle, timestamp: &str) -> String {
        template
            .replace("{camera}", &camera.name)
            .replace("{rtsp_url}", camera.urls.rtsp.as_deref().unwrap_or(""))
            .replace("{mjpeg_url}", camera.urls.mjpeg.as_deref().unwrap_or(""))
            .replace("{timestamp}", timestamp)
    }

    fn build_command(&self, program: &str, camera: &CameraHandle) -> Command {
        let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let mut command = Command::new(self.render(program, camera, &timestamp));
        command
            .args(
                self.config
                    .args
                    .iter()
                    .map(|arg| self.render(arg, camera, &timestamp)),
            )
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CaptureTrigger for CommandCapture {
    async fn start_capture(&self, camera: &CameraHandle) -> Result<(), CameraError> {
        let handle = camera.clone();
        let duration = self.config.duration();

        let Some(program) = self.config.command.as_deref() else {
            debug!(camera = %handle.name, duration_s = duration.as_secs(), "No capture command, holding lock for capture window");
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                handle.finish_capture();
            });
            return Ok(());
        };

        let mut child = self
            .build_command(program, camera)
            .spawn()
            .map_err(|e| CameraError::Capture(format!("failed to spawn {}: {}", program, e)))?;

        info!(camera = %handle.name, pid = child.id(), "Capture started");

        tokio::spawn(async move {
            let outcome = tokio::time::timeout(duration + CAPTURE_GRACE, child.wait()).await;
            match outcome {
                Ok(Ok(status)) if status.success() => {
                    debug!(camera = %handle.name, "Capture command finished");
                }
                Ok(Ok(status)) => {
                    warn!(camera = %handle.name, %status, "Capture command exited with failure");
                }
                Ok(Err(e)) => {
                    warn!(camera = %handle.name, error = %e, "Failed to wait for capture command");
                }
                Err(_) => {
                    warn!(camera = %handle.name, "Capture command overran, killing it");
                    if let Err(e) = child.kill().await {
                        warn!(camera = %handle.name, error = %e, "Failed to kill capture command");
                    }
                }
            }
            handle.finish_capture();
        });

        Ok(())
    }
}
