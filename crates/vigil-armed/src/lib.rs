//! Vigil Armed: arm mode, arm state and the presence-driven evaluator
//!
//! In `AUTOMATIC` mode a periodic evaluator arms the premises when no master
//! device is reachable and disarms them when one comes back. An operator can
//! override with `{MANUAL, ARMED}` or `{MANUAL, DISARMED}` and hand control
//! back with `{AUTOMATIC, AUTO}`.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//! use vigil_armed::{ArmedStateService, EvaluatorPolicy};
//! use vigil_events::{EventBus, EventKind};
//! use vigil_probe::testing::StaticPresence;
//!
//! # async fn example() {
//! let bus = EventBus::new();
//! let presence = Arc::new(StaticPresence::new(false));
//! let service = Arc::new(ArmedStateService::new(bus.clone(), presence, EvaluatorPolicy::default()));
//! bus.subscribe(&[EventKind::Armed], service.clone()).unwrap();
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(service.clone().run(shutdown.clone()));
//! # }
//! ```

pub mod policy;
pub mod service;

pub use policy::EvaluatorPolicy;
pub use service::{ArmedSnapshot, ArmedStateService};
