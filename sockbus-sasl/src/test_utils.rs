//! Helpers for exercising handshakes without a transport
//!
//! Compiled for unit tests and behind the `test-utils` feature so
//! integration tests and demos can drive two conversations back to
//! back in memory.

use sockbus_core::{Credentials, Guid};

use crate::conversation::{AuthConversation, AuthStatus};

/// Split an outgoing buffer into its CRLF-terminated lines. Panics on
/// trailing bytes, since the engine only ever emits whole lines.
pub fn wire_lines(bytes: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = bytes;
    while let Some(eol) = rest.windows(2).position(|pair| pair == b"\r\n") {
        lines.push(String::from_utf8_lossy(&rest[..eol]).into_owned());
        rest = &rest[eol + 2..];
    }
    assert!(
        rest.is_empty(),
        "output ended mid-line: {:?}",
        String::from_utf8_lossy(rest)
    );
    lines
}

/// A client and a server wired back to back, with a transcript of
/// everything each side said.
pub struct Loopback {
    pub client: AuthConversation,
    pub server: AuthConversation,
    pub from_client: Vec<String>,
    pub from_server: Vec<String>,
}

impl Loopback {
    pub fn new(client_credentials: Credentials, server_credentials: Credentials) -> Self {
        Loopback {
            client: AuthConversation::new_client(client_credentials),
            server: AuthConversation::new_server(Guid::generate(), server_credentials),
            from_client: Vec::new(),
            from_server: Vec::new(),
        }
    }

    /// Pump both sides until neither has anything left to deliver and
    /// return their final statuses. Configure the conversations before
    /// calling this; they are public fields for exactly that reason.
    pub fn run(&mut self) -> (AuthStatus, AuthStatus) {
        let mut client_status = self.client.advance();
        let mut server_status = self.server.advance();

        // Every real handshake settles in a handful of exchanges
        for _ in 0..64 {
            let mut delivered = false;

            let out = self.client.take_output();
            if !out.is_empty() {
                self.from_client.extend(wire_lines(&out));
                self.server.push_input(&out).expect("server buffer");
                delivered = true;
            }

            let out = self.server.take_output();
            if !out.is_empty() {
                self.from_server.extend(wire_lines(&out));
                self.client.push_input(&out).expect("client buffer");
                delivered = true;
            }

            if !delivered {
                return (client_status, server_status);
            }

            client_status = self.client.advance();
            server_status = self.server.advance();
        }

        panic!(
            "handshake never settled\nclient said: {:?}\nserver said: {:?}",
            self.from_client, self.from_server
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_lines_splits_on_crlf() {
        let lines = wire_lines(b"AUTH\r\nDATA 6162\r\n");
        assert_eq!(lines, vec!["AUTH", "DATA 6162"]);
        assert!(wire_lines(b"").is_empty());
    }

    #[test]
    #[should_panic(expected = "mid-line")]
    fn test_wire_lines_rejects_partial_line() {
        wire_lines(b"AUTH\r\nBEG");
    }
}
