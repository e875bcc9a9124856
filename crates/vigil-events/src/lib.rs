//! Vigil Events: typed event variants and the in-process event bus
//!
//! All coordination between the armed-state machine, the camera controllers
//! and the notification fan-out flows through the [`EventBus`]. Events form a
//! closed sum type ([`Event`]), so subscribers dispatch with an exhaustive
//! `match` instead of runtime type inspection.
//!
//! # Delivery contract
//!
//! - `publish` is fire-and-forget and never waits on a handler.
//! - Each subscriber sees the events of its kinds in publication order.
//! - Subscribers run concurrently with each other and with publishers.
//! - A handler error or panic is logged and counted, never retried.

pub mod bus;
pub mod error;
pub mod event;

pub use bus::{BusStats, EventBus, EventHandler, HandlerError, SubscriptionId};
pub use error::BusError;
pub use event::{
    ArmMode, ArmState, ArmedEvent, CameraOptions, CameraRebootEvent, Event, EventKind,
    MotionDetectedEvent, MotionRegion, MotionToNotifyEvent, OptionsChangedEvent,
};
