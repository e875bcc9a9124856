//! Detector lifecycle states
//!
//! ```text
//!   Disabled ──enable()──► Enabling ──started──► Enabled
//!      ▲                      │ offline / start failed   │
//!      │◄─────────────────────┘                          │ disable()
//!      └────────────────── Disabling ◄───────────────────┘
//! ```

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorState {
    Disabled,
    Enabling,
    Enabled,
    Disabling,
}

impl DetectorState {
    /// String representation
    pub fn as_str(&self) -> &str {
        match self {
            DetectorState::Disabled => "disabled",
            DetectorState::Enabling => "enabling",
            DetectorState::Enabled => "enabled",
            DetectorState::Disabling => "disabling",
        }
    }
}
