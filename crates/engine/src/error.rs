//! Error types for the simulation engine

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    /// Out-of-range or non-finite input. Raised before any trial runs.
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Simulation cancelled")]
    Cancelled,

    #[error("Simulation deadline exceeded after {completed}/{total} trials")]
    DeadlineExceeded { completed: u32, total: u32 },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SimulationError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        SimulationError::InvalidConfiguration(msg.into())
    }

    /// True when the caller supplied bad input (as opposed to an aborted or failed run).
    pub fn is_client_error(&self) -> bool {
        matches!(self, SimulationError::InvalidConfiguration(_))
    }
}

pub type SimResult<T> = Result<T, SimulationError>;
