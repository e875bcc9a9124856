//! Liveness vocabulary shared by every prober

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Reachability of one network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IpState {
    /// The host answered
    Online,

    /// The host did not answer within the timeout
    Offline,

    /// The probe itself could not be carried out (bad address, local failure)
    Error,
}

impl IpState {
    /// String representation
    pub fn as_str(&self) -> &str {
        match self {
            IpState::Online => "ONLINE",
            IpState::Offline => "OFFLINE",
            IpState::Error => "ERROR",
        }
    }

    pub fn is_online(&self) -> bool {
        matches!(self, IpState::Online)
    }
}

impl fmt::Display for IpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Determines whether an address is reachable right now
///
/// Implementations must not cache: every call reflects the network at the
/// time of the call.
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, address: &str) -> IpState;
}

/// Answers whether any trusted master device is present on the network
#[async_trait]
pub trait MasterPresence: Send + Sync {
    async fn masters_online(&self) -> bool;
}
