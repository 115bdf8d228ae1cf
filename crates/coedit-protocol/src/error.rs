//! Error types for the Coedit protocol

use thiserror::Error;

/// Protocol error types
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Malformed event: {0}")]
    Malformed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}
