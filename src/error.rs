//! Error handling for the particle-interaction core
//!
//! Configuration problems are rejected before any kernel runs. Numerical
//! degeneracy (zero density, ill-conditioned extrapolation) is handled
//! locally by the kernels and never shows up here.

use thiserror::Error;

/// Result type for every fallible entry point of the crate
pub type SphResult<T> = Result<T, SphError>;

#[derive(Debug, Error)]
pub enum SphError {
    #[error("phase table size mismatch for {table}: expected {expected}, found {found}")]
    PhaseCountMismatch {
        table: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("phase {phase} appears more than once in {table}")]
    DuplicatePhase { table: &'static str, phase: u16 },

    #[error("particle slot {slot} references phase {phase}, which is not uploaded")]
    UnknownPhase { slot: usize, phase: u16 },

    #[error("phase constants have not been uploaded")]
    PhaseTableNotUploaded,

    #[error("stress buffer supplied for yield-stress phase {phase} but no Drucker-Prager constants are uploaded")]
    MissingPlasticity { phase: u16 },

    #[error("invalid constants for phase {phase}: {reason}")]
    InvalidPhase { phase: u16, reason: String },

    #[error("buffer `{buffer}` has length {found}, expected at least {expected}")]
    BufferLength {
        buffer: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("invalid periodic duplication: {reason}")]
    InvalidDuplication { reason: String },

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("configuration serialization error: {0}")]
    ConfigWrite(#[from] toml::ser::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("kernel launch failed: {message}")]
    Launch { message: String },

    #[error("kernel `{label}` panicked: {message}")]
    KernelPanicked { label: String, message: String },
}

/// Check that a column holds at least `expected` elements
pub fn check_len(buffer: &'static str, found: usize, expected: usize) -> SphResult<()> {
    if found < expected {
        return Err(SphError::BufferLength {
            buffer,
            expected,
            found,
        });
    }
    Ok(())
}

/// Create an invalid parameter error
pub fn invalid_parameter(name: &'static str, reason: impl std::fmt::Display) -> SphError {
    SphError::InvalidParameter {
        name,
        reason: reason.to_string(),
    }
}

/// Create an invalid duplication error
pub fn invalid_duplication(reason: impl std::fmt::Display) -> SphError {
    SphError::InvalidDuplication {
        reason: reason.to_string(),
    }
}

/// Create an invalid phase error
pub fn invalid_phase(phase: u16, reason: impl std::fmt::Display) -> SphError {
    SphError::InvalidPhase {
        phase,
        reason: reason.to_string(),
    }
}
