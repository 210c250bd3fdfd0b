//! Error types for circuit construction.
//!
//! Every operation past construction trusts the caller; the only fallible
//! operation in this crate is building an [`crate::circuit::UnstampedCircuit`].

use thiserror::Error;

/// Result type alias using [`CircuitError`].
pub type Result<T> = std::result::Result<T, CircuitError>;

/// Errors that can occur while constructing a circuit.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum CircuitError {
    /// Time step must be strictly positive.
    #[error("time step must be positive, got {dt}")]
    InvalidTimeStep { dt: f64 },
}

impl CircuitError {
    /// Create an invalid-time-step error.
    pub fn invalid_time_step(dt: f64) -> Self {
        Self::InvalidTimeStep { dt }
    }
}
