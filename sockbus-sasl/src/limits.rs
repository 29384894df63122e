//! Hard limits the handshake enforces against misbehaving peers

/// Ceiling on either conversation buffer. A peer that pushes past this
/// without completing a command is treated as hostile and disconnected.
pub const MAX_BUFFER_LEN: usize = 16 * 1024;

/// Failed authentication attempts a server tolerates before giving up
/// on the connection.
pub const DEFAULT_MAX_FAILURES: u32 = 6;

/// Size of the random challenges exchanged by the cookie mechanism,
/// in bytes before hex encoding.
pub const CHALLENGE_LEN: usize = 16;
