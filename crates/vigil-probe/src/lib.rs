//! Vigil Probe: network liveness and master presence
//!
//! The probe layer answers two questions for the rest of the system:
//!
//! - Is this camera reachable right now? ([`LivenessProbe`])
//! - Is any master device home? ([`MasterPresence`])
//!
//! Answers are never cached; each decision re-probes the network.

pub mod error;
pub mod presence;
pub mod state;
pub mod tcp;
pub mod testing;

pub use error::ProbeError;
pub use presence::{MasterState, PresenceMonitor};
pub use state::{IpState, LivenessProbe, MasterPresence};
pub use tcp::{ProbeConfig, TcpProbe};
