/*!
 * Vigil - home-security orchestration daemon
 *
 * Tracks whether the premises are armed, reacts to motion from independent
 * cameras and drives captures, notifications and camera reboots so that each
 * physical event triggers each action at most once.
 *
 * The core lives in the member crates:
 * - `vigil-events`: event variants and the in-process bus
 * - `vigil-probe`: liveness probing and master presence
 * - `vigil-armed`: armed-state machine and evaluator
 * - `vigil-camera`: per-camera lifecycle controller
 *
 * This crate adds configuration, logging, the production collaborators and
 * the `HomeSystem` that wires everything together.
 */

pub mod capture;
pub mod config;
pub mod error;
pub mod health;
pub mod hooks;
pub mod logging;
pub mod notify;
pub mod report;
pub mod storage;
pub mod system;

// Re-export commonly used types
pub use config::VigilConfig;
pub use error::{Result, VigilError};
pub use notify::{LogNotifier, Notifier};
pub use system::{Collaborators, HomeSystem};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
