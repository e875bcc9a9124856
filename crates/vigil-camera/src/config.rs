//! Static per-camera configuration and URL templates
//!
//! URL templates may reference `${ip}`, `${httpPort}`, `${rtspPort}`,
//! `${login}` and `${password}`; they are expanded once when the controller is
//! built.

use crate::error::CameraError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use vigil_events::CameraOptions;

const PLACEHOLDERS: [&str; 5] = ["ip", "httpPort", "rtspPort", "login", "password"];

fn default_http_port() -> u16 {
    80
}

fn default_rtsp_port() -> u16 {
    554
}

fn default_interval_ms() -> u64 {
    500
}

fn default_reboot_timeout_secs() -> u64 {
    60
}

fn default_noise_level() -> u32 {
    5
}

fn default_motion_area() -> u32 {
    20
}

/// One `[[cameras]]` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraConfig {
    /// Unique key of the camera
    pub name: String,

    /// Address used for liveness probes and URL templates
    pub ip: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,

    #[serde(default)]
    pub login: String,

    #[serde(default)]
    pub password: String,

    /// Still snapshot, polled by the motion detector
    #[serde(default)]
    pub jpeg_url_template: Option<String>,

    #[serde(default)]
    pub mjpeg_url_template: Option<String>,

    /// Stream handed to the capture trigger
    #[serde(default)]
    pub rtsp_url_template: Option<String>,

    /// GET endpoint that power-cycles the camera
    #[serde(default)]
    pub reboot_url_template: Option<String>,

    /// Detector polling interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// How long a reboot may take before it is treated as failed
    #[serde(default = "default_reboot_timeout_secs")]
    pub reboot_timeout_secs: u64,

    /// Frame change (percent) below which differences are noise
    #[serde(default = "default_noise_level")]
    pub noise_level: u32,

    /// Frame change (percent) at which motion is reported
    #[serde(default = "default_motion_area")]
    pub motion_area: u32,

    /// Enable detection at startup
    #[serde(default)]
    pub autostart_monitoring: bool,

    /// Detect whenever reachable; exempt from disable
    #[serde(default)]
    pub continuous_monitoring: bool,

    /// Include in the periodic liveness sweep
    #[serde(default)]
    pub health_check_enabled: bool,
}

/// Expanded URLs of one camera
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CameraUrls {
    pub jpeg: Option<String>,
    pub mjpeg: Option<String>,
    pub rtsp: Option<String>,
    pub reboot: Option<String>,
}

impl CameraConfig {
    /// Camera with default timings and no URLs
    pub fn new(name: impl Into<String>, ip: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ip: ip.into(),
            http_port: default_http_port(),
            rtsp_port: default_rtsp_port(),
            login: String::new(),
            password: String::new(),
            jpeg_url_template: None,
            mjpeg_url_template: None,
            rtsp_url_template: None,
            reboot_url_template: None,
            interval_ms: default_interval_ms(),
            reboot_timeout_secs: default_reboot_timeout_secs(),
            noise_level: default_noise_level(),
            motion_area: default_motion_area(),
            autostart_monitoring: false,
            continuous_monitoring: false,
            health_check_enabled: false,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn reboot_timeout(&self) -> Duration {
        Duration::from_secs(self.reboot_timeout_secs)
    }

    /// The runtime-adjustable subset of this configuration
    pub fn options(&self) -> CameraOptions {
        CameraOptions {
            continuous_monitoring: self.continuous_monitoring,
            autostart_monitoring: self.autostart_monitoring,
            health_check_enabled: self.health_check_enabled,
        }
    }

    /// Expand every configured template
    pub fn urls(&self) -> CameraUrls {
        CameraUrls {
            jpeg: self.jpeg_url_template.as_deref().map(|t| self.expand(t)),
            mjpeg: self.mjpeg_url_template.as_deref().map(|t| self.expand(t)),
            rtsp: self.rtsp_url_template.as_deref().map(|t| self.expand(t)),
            reboot: self.reboot_url_template.as_deref().map(|t| self.expand(t)),
        }
    }

    fn expand(&self, template: &str) -> String {
        template
            .replace("${ip}", &self.ip)
            .replace("${httpPort}", &self.http_port.to_string())
            .replace("${rtspPort}", &self.rtsp_port.to_string())
            .replace("${login}", &self.login)
            .replace("${password}", &self.password)
    }

    pub fn validate(&self) -> Result<(), CameraError> {
        let invalid = |reason: String| CameraError::InvalidConfig {
            camera: self.name.clone(),
            reason,
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty".to_string()));
        }
        if self.ip.trim().is_empty() {
            return Err(invalid("ip must not be empty".to_string()));
        }
        if self.interval_ms == 0 {
            return Err(invalid("interval_ms must be greater than 0".to_string()));
        }
        if self.reboot_timeout_secs == 0 {
            return Err(invalid(
                "reboot_timeout_secs must be greater than 0".to_string(),
            ));
        }

        let templates = [
            &self.jpeg_url_template,
            &self.mjpeg_url_template,
            &self.rtsp_url_template,
            &self.reboot_url_template,
        ];
        for template in templates.into_iter().flatten() {
            if let Some(unknown) = unknown_placeholder(template) {
                return Err(invalid(format!(
                    "unknown placeholder ${{{}}} in URL template",
                    unknown
                )));
            }
        }

        Ok(())
    }
}

fn unknown_placeholder(template: &str) -> Option<String> {
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = after.find('}')?;
        let name = &after[..end];
        if !PLACEHOLDERS.contains(&name) {
            return Some(name.to_string());
        }
        rest = &after[end + 1..];
    }
    None
}
