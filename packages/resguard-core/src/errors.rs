//! Error types for resguard-core.
//!
//! Analysis degradation (unknown callees, unlowerable statements, iteration
//! bounds) is never an error; those surface as status values. This enum covers
//! genuine API misuse at the pipeline boundary.

use thiserror::Error;

/// Main error type for resguard-core operations
#[derive(Debug, Error)]
pub enum ResguardError {
    /// The named function does not exist in the analyzed program
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    /// A slice request named a node that is not a call site
    #[error("invalid slice target: {0}")]
    InvalidTarget(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for resguard operations
pub type Result<T> = std::result::Result<T, ResguardError>;
