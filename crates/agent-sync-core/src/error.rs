//! Error types for the core data model.

use thiserror::Error;

/// Errors raised while interpreting wire-level values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown operation code: {0}")]
    UnknownOperation(u8),

    #[error("unknown sync mode code: {0}")]
    UnknownMode(u8),
}
