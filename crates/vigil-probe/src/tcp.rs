//! TCP reachability probe
//!
//! A host counts as `Online` when any probed port either accepts the
//! connection or actively refuses it: a refusal is still an answer from a live
//! network stack. Only silence (timeouts, unreachable routes) means `Offline`.

use crate::error::ProbeError;
use crate::state::{IpState, LivenessProbe};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::{debug, trace};

fn default_timeout_ms() -> u64 {
    1000
}

fn default_ports() -> Vec<u16> {
    // http, https, rtsp, iOS lockdown (phones keep it open while on wifi)
    vec![80, 443, 554, 62078]
}

/// Probe tuning, read from the `[probe]` config section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// Per-port connect timeout in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Ports tried when the address does not carry its own port
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            ports: default_ports(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.timeout_ms == 0 {
            return Err(ProbeError::ZeroTimeout);
        }
        if self.ports.is_empty() {
            return Err(ProbeError::NoPorts);
        }
        Ok(())
    }
}

/// [`LivenessProbe`] that attempts TCP connections in parallel
#[derive(Debug, Clone)]
pub struct TcpProbe {
    timeout: Duration,
    ports: Vec<u16>,
}

impl TcpProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self, ProbeError> {
        config.validate()?;
        Ok(Self {
            timeout: Duration::from_millis(config.timeout_ms),
            ports: config.ports.clone(),
        })
    }

    fn targets(&self, address: &str) -> Vec<(String, u16)> {
        if let Ok(socket) = address.parse::<SocketAddr>() {
            return vec![(socket.ip().to_string(), socket.port())];
        }

        if let Some((host, port)) = address.rsplit_once(':') {
            if !host.contains(':') {
                if let Ok(port) = port.parse::<u16>() {
                    return vec![(host.to_string(), port)];
                }
            }
        }

        self.ports
            .iter()
            .map(|port| (address.to_string(), *port))
            .collect()
    }

    async fn probe_port(&self, host: &str, port: u16) -> IpState {
        let state = match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await
        {
            Ok(Ok(_stream)) => IpState::Online,
            Ok(Err(e)) => classify(&e),
            Err(_elapsed) => IpState::Offline,
        };
        trace!(host, port, %state, "Probed port");
        state
    }
}

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn probe(&self, address: &str) -> IpState {
        let targets = self.targets(address);
        let states = join_all(
            targets
                .iter()
                .map(|(host, port)| self.probe_port(host, *port)),
        )
        .await;

        let state = aggregate(&states);
        debug!(address, %state, "Liveness probe finished");
        state
    }
}

fn classify(error: &io::Error) -> IpState {
    match error.kind() {
        io::ErrorKind::ConnectionRefused | io::ErrorKind::ConnectionReset => IpState::Online,
        io::ErrorKind::TimedOut
        | io::ErrorKind::HostUnreachable
        | io::ErrorKind::NetworkUnreachable => IpState::Offline,
        _ => IpState::Error,
    }
}

fn aggregate(states: &[IpState]) -> IpState {
    if states.iter().any(|s| *s == IpState::Online) {
        IpState::Online
    } else if states.iter().any(|s| *s == IpState::Offline) {
        IpState::Offline
    } else {
        IpState::Error
    }
}
