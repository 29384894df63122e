//! Identity tokens shared across the handshake crates

use rand::rngs::OsRng;
use rand::RngCore;

/// Default cookie context when the owner configures none
pub const DEFAULT_CONTEXT: &str = "sockbus_general";

/// Server identity: 16 random bytes, lowercase hex on the wire
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Guid([u8; Guid::LEN]);

impl Guid {
    /// Raw length in bytes
    pub const LEN: usize = 16;

    /// Mint a fresh guid from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; Self::LEN];
        OsRng.fill_bytes(&mut bytes);
        Guid(bytes)
    }

    /// Wrap existing raw bytes
    pub fn from_bytes(bytes: [u8; Self::LEN]) -> Self {
        Guid(bytes)
    }

    /// Parse the 32-character hex wire form
    pub fn from_hex(s: &str) -> crate::Result<Self> {
        let raw = hex::decode(s)
            .map_err(|_| crate::BusError::InvalidGuid(format!("not hex: '{}'", s)))?;
        let bytes: [u8; Self::LEN] = raw.as_slice().try_into().map_err(|_| {
            crate::BusError::InvalidGuid(format!("expected {} bytes, got {}", Self::LEN, raw.len()))
        })?;
        Ok(Guid(bytes))
    }

    /// Get the raw bytes
    pub fn as_bytes(&self) -> &[u8; Self::LEN] {
        &self.0
    }

    /// Lowercase hex wire form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Guid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Cookie context: names one keyring file under the keyring directory
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Context(String);

impl Context {
    /// Create a new context with validation
    pub fn new(name: &str) -> crate::Result<Self> {
        if name.is_empty() {
            return Err(crate::BusError::InvalidContext("empty name".to_string()));
        }

        if !name.is_ascii() {
            return Err(crate::BusError::InvalidContext(
                "non-ASCII bytes not allowed".to_string(),
            ));
        }

        // The context becomes a file name, so path separators, dots and
        // whitespace (including CR/LF) are all rejected.
        if name
            .chars()
            .any(|c| c == '/' || c == '\\' || c == '.' || c.is_ascii_whitespace() || c.is_ascii_control())
        {
            return Err(crate::BusError::InvalidContext(format!(
                "invalid characters in '{}'",
                name.escape_default()
            )));
        }

        Ok(Context(name.to_string()))
    }

    /// Get the context name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Context {
    fn default() -> Self {
        Context(DEFAULT_CONTEXT.to_string())
    }
}

impl std::fmt::Display for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guid_hex_round_trip() {
        let guid = Guid::generate();
        let parsed = Guid::from_hex(&guid.to_hex()).unwrap();
        assert_eq!(guid, parsed);
        assert_eq!(guid.to_hex().len(), 32);
    }

    #[test]
    fn test_guid_rejects_bad_hex() {
        assert!(Guid::from_hex("zz").is_err());
        assert!(Guid::from_hex("deadbeef").is_err()); // too short
        let long = "00".repeat(17);
        assert!(Guid::from_hex(&long).is_err());
    }

    #[test]
    fn test_context_validation() {
        // Valid tokens
        assert!(Context::new("sockbus_general").is_ok());
        assert!(Context::new("my-app-1").is_ok());

        // Invalid tokens
        assert!(Context::new("").is_err());
        assert!(Context::new("with space").is_err());
        assert!(Context::new("with/slash").is_err());
        assert!(Context::new("with\\backslash").is_err());
        assert!(Context::new(".dotfile").is_err());
        assert!(Context::new("mid.dot").is_err());
        assert!(Context::new("line\nbreak").is_err());
        assert!(Context::new("carriage\rreturn").is_err());
        assert!(Context::new("tab\there").is_err());
        assert!(Context::new("non-ascii-\u{e9}").is_err());
    }

    #[test]
    fn test_context_default() {
        assert_eq!(Context::default().as_str(), DEFAULT_CONTEXT);
    }
}
