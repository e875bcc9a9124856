//! In-memory probes for tests
//!
//! These let callers script network conditions without touching sockets.

use crate::state::{IpState, LivenessProbe, MasterPresence};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Probe answering from a scripted table
pub struct StaticProbe {
    states: Mutex<HashMap<String, IpState>>,
    fallback: Mutex<IpState>,
    calls: AtomicUsize,
}

impl StaticProbe {
    /// Every address answers `fallback` unless overridden with [`set`](Self::set)
    pub fn new(fallback: IpState) -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            fallback: Mutex::new(fallback),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, address: &str, state: IpState) {
        self.states
            .lock()
            .unwrap()
            .insert(address.to_string(), state);
    }

    pub fn set_fallback(&self, state: IpState) {
        *self.fallback.lock().unwrap() = state;
    }

    /// Number of probes answered so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for StaticProbe {
    async fn probe(&self, address: &str) -> IpState {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let scripted = self.states.lock().unwrap().get(address).copied();
        scripted.unwrap_or_else(|| *self.fallback.lock().unwrap())
    }
}

/// Presence source with a switch
#[derive(Default)]
pub struct StaticPresence {
    online: AtomicBool,
    calls: AtomicUsize,
}

impl StaticPresence {
    pub fn new(online: bool) -> Self {
        Self {
            online: AtomicBool::new(online),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MasterPresence for StaticPresence {
    async fn masters_online(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.online.load(Ordering::SeqCst)
    }
}
