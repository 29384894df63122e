//! Line-oriented authentication handshake for sockbus connections.
//!
//! A connection owner feeds raw transport bytes into an
//! [`AuthConversation`] with [`AuthConversation::push_input`], calls
//! [`AuthConversation::advance`], and acts on the returned
//! [`AuthStatus`], shipping whatever [`AuthConversation::take_output`]
//! yields back to the peer. The engine never touches a socket itself.
//!
//! Three mechanisms are built in, tried in a fixed preference order:
//! `EXTERNAL` (trust the transport's credentials), `DBUS_COOKIE_SHA1`
//! (prove access to a per-user cookie file, see `sockbus-keyring`) and
//! `ANONYMOUS` (accept anyone).

pub mod command;
pub mod conversation;
pub mod error;
pub mod limits;
pub mod mech;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use command::Command;
pub use conversation::*;
pub use error::AuthError;
pub use mech::supported_mechanisms;

/// Result type alias used throughout this crate
pub type Result<T> = std::result::Result<T, AuthError>;
