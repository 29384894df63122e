//! Authentication mechanisms
//!
//! A mechanism is a named bundle of function slots the conversation
//! calls into; all mutable state lives on the conversation itself, so
//! the table below is a plain static. Order matters: it is both the
//! client's attempt order and the order servers advertise in
//! `REJECTED` replies.

use std::fmt;

use crate::conversation::AuthConversation;
use crate::Result;

pub mod anonymous;
pub mod cookie;
pub mod external;

pub(crate) type ServerDataFn = fn(&mut AuthConversation, &[u8]) -> Result<()>;
pub(crate) type ClientDataFn = fn(&mut AuthConversation, &[u8]) -> Result<()>;
pub(crate) type InitialResponseFn = fn(&mut AuthConversation) -> Result<Vec<u8>>;
pub(crate) type ShutdownFn = fn(&mut AuthConversation);
pub(crate) type CodecFn = fn(&mut AuthConversation, &[u8], &mut Vec<u8>) -> Result<()>;

/// One entry in the mechanism table. The encode/decode slots exist for
/// mechanisms that negotiate a post-auth transform of the byte stream;
/// none of the built-in mechanisms use them.
pub struct Mechanism {
    pub name: &'static str,
    pub(crate) server_data: ServerDataFn,
    pub(crate) server_encode: Option<CodecFn>,
    pub(crate) server_decode: Option<CodecFn>,
    pub(crate) server_shutdown: Option<ShutdownFn>,
    pub(crate) client_initial_response: Option<InitialResponseFn>,
    pub(crate) client_data: ClientDataFn,
    pub(crate) client_encode: Option<CodecFn>,
    pub(crate) client_decode: Option<CodecFn>,
    pub(crate) client_shutdown: Option<ShutdownFn>,
}

impl fmt::Debug for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mechanism")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Every mechanism this build knows, in preference order
pub(crate) static MECHANISMS: &[Mechanism] = &[
    Mechanism {
        name: external::NAME,
        server_data: external::server_data,
        server_encode: None,
        server_decode: None,
        server_shutdown: None,
        client_initial_response: Some(external::client_initial_response),
        client_data: external::client_data,
        client_encode: None,
        client_decode: None,
        client_shutdown: None,
    },
    Mechanism {
        name: cookie::NAME,
        server_data: cookie::server_data,
        server_encode: None,
        server_decode: None,
        server_shutdown: Some(cookie::server_shutdown),
        client_initial_response: Some(cookie::client_initial_response),
        client_data: cookie::client_data,
        client_encode: None,
        client_decode: None,
        client_shutdown: None,
    },
    Mechanism {
        name: anonymous::NAME,
        server_data: anonymous::server_data,
        server_encode: None,
        server_decode: None,
        server_shutdown: None,
        client_initial_response: Some(anonymous::client_initial_response),
        client_data: anonymous::client_data,
        client_encode: None,
        client_decode: None,
        client_shutdown: None,
    },
];

/// Names of the built-in mechanisms, in the order they are tried and
/// advertised.
pub fn supported_mechanisms() -> impl Iterator<Item = &'static str> {
    MECHANISMS.iter().map(|mech| mech.name)
}

/// Look a mechanism up by its wire name, honoring an allow-list
pub(crate) fn find_mechanism(
    name: &[u8],
    allowed: Option<&[String]>,
) -> Option<&'static Mechanism> {
    if let Some(allowed) = allowed {
        if !allowed.iter().any(|entry| entry.as_bytes() == name) {
            return None;
        }
    }
    MECHANISMS.iter().find(|mech| mech.name.as_bytes() == name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_is_fixed() {
        let names: Vec<&str> = supported_mechanisms().collect();
        assert_eq!(names, vec!["EXTERNAL", "DBUS_COOKIE_SHA1", "ANONYMOUS"]);
    }

    #[test]
    fn test_find_mechanism_by_name() {
        assert_eq!(find_mechanism(b"EXTERNAL", None).map(|m| m.name), Some("EXTERNAL"));
        assert!(find_mechanism(b"KERBEROS_V4", None).is_none());
        assert!(find_mechanism(b"external", None).is_none());
    }

    #[test]
    fn test_find_mechanism_honors_allow_list() {
        let allowed = vec!["ANONYMOUS".to_string()];
        assert!(find_mechanism(b"EXTERNAL", Some(&allowed)).is_none());
        assert_eq!(
            find_mechanism(b"ANONYMOUS", Some(&allowed)).map(|m| m.name),
            Some("ANONYMOUS")
        );
    }
}
