//! Error types for sockbus

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("Invalid cookie context: {0}")]
    InvalidContext(String),

    #[error("Invalid server guid: {0}")]
    InvalidGuid(String),

    #[error("Malformed credential: {0}")]
    MalformedCredential(String),
}
