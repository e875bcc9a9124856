//! Error types for the event bus

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Event bus has been shut down")]
    Closed,

    #[error("Subscriber {subscriber} did not name any event kinds")]
    NoEventKinds { subscriber: String },
}
