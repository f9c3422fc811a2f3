//! Error types for the party hub core

use thiserror::Error;

use crate::round::RoundPhase;

/// Result type alias for party hub operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a round
#[derive(Debug, Error)]
pub enum Error {
    /// Operation invoked in a phase that does not allow it
    #[error("{operation} is not valid while the round is {phase}")]
    OrderingViolation {
        /// Operation that was attempted
        operation: &'static str,
        /// Phase the round was in
        phase: RoundPhase,
    },

    /// Host agent could not be reached or produced no scenario
    #[error("host unavailable: {0}")]
    HostUnavailable(String),

    /// Audio capture error
    #[error("audio error: {0}")]
    Audio(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Game id not present in the catalog
    #[error("unknown game: {0}")]
    UnknownGame(String),

    /// The owning controller has been torn down
    #[error("round is closed")]
    RoundClosed,
}
