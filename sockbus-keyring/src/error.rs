//! Error types for the keyring store

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Keyring owner has no unix uid")]
    AnonymousOwner,

    #[error("No default keyring directory for uid {0}: only the current user's is known")]
    ForeignUser(u32),

    #[error("Cannot locate the keyring directory: HOME is not set")]
    NoHomeDirectory,

    #[error("Keyring directory is not private: {0}")]
    NotPrivate(String),

    #[error("Could not lock keyring: {0}")]
    LockFailed(String),

    #[error("No usable cookie after rotation")]
    NoFreshKey,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
