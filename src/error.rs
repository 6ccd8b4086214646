//! Error types shared by every engine.
//!
//! `InvalidInput` and `Infeasible` are fatal for a run and are always
//! reported to the caller, never folded into an infinite-cost result.

use thiserror::Error;

/// Result type alias used throughout the crate.
pub type TspResult<T> = Result<T, TspError>;

/// Unified error type for matrix construction, engines and I/O.
#[derive(Debug, Error)]
pub enum TspError {
    /// Malformed matrix, bad parameters, or a problem too large for the engine.
    #[error("invalid input: {message}")]
    InvalidInput {
        /// What was wrong with the input.
        message: String,
    },

    /// No Hamiltonian cycle with finite cost exists (or none was found).
    #[error("infeasible: {message}")]
    Infeasible {
        /// Which engine gave up and why.
        message: String,
    },

    /// A non-finite value escaped an internal guard.
    #[error("numeric instability detected at {location}")]
    NumericInstability {
        /// Where the non-finite value was detected.
        location: String,
    },

    /// Instance file could not be parsed.
    #[error("parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl TspError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TspError::InvalidInput { message: message.into() }
    }

    pub fn infeasible(message: impl Into<String>) -> Self {
        TspError::Infeasible { message: message.into() }
    }

    pub fn numeric_instability(location: impl Into<String>) -> Self {
        TspError::NumericInstability { location: location.into() }
    }

    /// Whether this error is one of the two fatal problem-level kinds.
    pub fn is_fatal(&self) -> bool {
        matches!(self, TspError::InvalidInput { .. } | TspError::Infeasible { .. })
    }
}
