//! Error types for the handshake engine
//!
//! Protocol-level trouble (bad hex, wrong proof, unknown commands) is
//! answered on the wire and never surfaces here; these errors cover the
//! conversation's own resources.

use thiserror::Error;

/// Errors surfaced by conversation operations
#[derive(Error, Debug)]
pub enum AuthError {
    /// A buffer could not grow. The operation took no other effect and
    /// may be retried once memory pressure eases.
    #[error("Buffer allocation failed: {0}")]
    Resources(#[from] std::collections::TryReserveError),

    /// The operation is only meaningful once the handshake succeeded
    #[error("Conversation is not authenticated")]
    NotAuthenticated,
}
