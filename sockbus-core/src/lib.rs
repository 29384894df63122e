//! Core types for the sockbus authentication handshake

pub mod credentials;
pub mod error;
pub mod sha1;
pub mod time;
pub mod types;

pub use credentials::*;
pub use error::*;
pub use sha1::*;
pub use time::*;
pub use types::*;

/// Result type alias for sockbus core operations
pub type Result<T> = std::result::Result<T, BusError>;
