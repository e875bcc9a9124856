//! Master presence: is any trusted device on the network?
//!
//! Masters are the household's phones (or other personal devices). While any
//! of them answers, the premises are considered occupied and the automatic
//! evaluator keeps the system disarmed.

use crate::state::{IpState, LivenessProbe, MasterPresence};
use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Reachability of one master, for status reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MasterState {
    pub name: String,
    pub address: String,
    pub state: IpState,
}

/// Probes the configured master set
pub struct PresenceMonitor {
    /// address -> display name
    masters: BTreeMap<String, String>,
    probe: Arc<dyn LivenessProbe>,
}

impl PresenceMonitor {
    pub fn new(masters: BTreeMap<String, String>, probe: Arc<dyn LivenessProbe>) -> Self {
        Self { masters, probe }
    }

    pub fn master_count(&self) -> usize {
        self.masters.len()
    }

    /// Probe every master concurrently
    pub async fn states(&self) -> Vec<MasterState> {
        join_all(self.masters.iter().map(|(address, name)| async move {
            MasterState {
                name: name.clone(),
                address: address.clone(),
                state: self.probe.probe(address).await,
            }
        }))
        .await
    }
}

#[async_trait]
impl MasterPresence for PresenceMonitor {
    /// True if **any** master answers; an empty master set is never present
    async fn masters_online(&self) -> bool {
        let states = self.states().await;
        let present = states.iter().any(|m| m.state.is_online());
        debug!(
            masters = states.len(),
            present,
            "Master presence evaluated"
        );
        present
    }
}
