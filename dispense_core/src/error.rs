use thiserror::Error;

/// Why a control command was rejected. A rejected command leaves engine
/// state and actuator outputs untouched.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    #[error("invalid pump id: {0}")]
    InvalidPump(u8),
    #[error("target volume must be positive and finite")]
    InvalidTarget,
    #[error("pump {0} is already dispensing")]
    AlreadyActive(u8),
    #[error("pump {0} is faulted; clear the fault first")]
    Faulted(u8),
}

/// Why a session faulted. Captured at the moment of the transition and
/// carried inside `PumpState::Faulted`; timeout values are the ones the
/// check observed, not recomputed on read.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum FaultCause {
    #[error("dispensing took too long ({elapsed_ms} ms elapsed, limit {limit_ms} ms)")]
    Timeout { elapsed_ms: u64, limit_ms: u64 },
    #[error("emergency stop")]
    EmergencyStop,
}

#[derive(Debug, Error, Clone)]
pub enum BuildError {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
}

pub type Result<T> = eyre::Result<T>;
pub use eyre::Report;
