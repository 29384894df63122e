//! ANONYMOUS: accept anyone who asks
//!
//! The server authorizes an identity carrying no user fact at all. The
//! client may attach a free-form UTF-8 trace string; by convention a
//! string containing `@` is a contact address. It is logged and
//! otherwise ignored.

use tracing::debug;

use crate::conversation::AuthConversation;
use crate::Result;

pub(crate) const NAME: &str = "ANONYMOUS";

pub(crate) fn server_data(conv: &mut AuthConversation, data: &[u8]) -> Result<()> {
    if !data.is_empty() {
        match std::str::from_utf8(data) {
            Ok(trace) => debug!("server: anonymous trace '{}'", trace.escape_default()),
            Err(_) => {
                debug!("server: anonymous trace data was not UTF-8");
                return conv.send_rejected();
            }
        }
    }

    conv.desired_identity.clear();

    // No user fact, but the transport's pid observation is still real
    if let Some(pid) = conv.credentials.pid() {
        conv.authorized_identity.set_pid(pid);
    }

    conv.send_ok()?;
    debug!("server: authenticated client as anonymous");
    Ok(())
}

pub(crate) fn client_initial_response(_conv: &mut AuthConversation) -> Result<Vec<u8>> {
    // A trace string, not an identity
    Ok(format!("sockbus {}", env!("CARGO_PKG_VERSION")).into_bytes())
}

pub(crate) fn client_data(conv: &mut AuthConversation, _data: &[u8]) -> Result<()> {
    // Nothing to prove; answer any challenge with empty data
    conv.send_data(&[])
}
