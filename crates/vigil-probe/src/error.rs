//! Error types for probe construction

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Probe needs at least one TCP port")]
    NoPorts,

    #[error("Probe timeout must be greater than 0")]
    ZeroTimeout,
}
