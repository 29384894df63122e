//! EXTERNAL: trust the identity the transport already established
//!
//! The client asserts a uid (or nothing, deferring to the transport)
//! and the server checks the assertion against the credentials the
//! socket reported. No secret changes hands; the transport is the
//! proof.

use tracing::debug;

use sockbus_core::Credentials;

use crate::conversation::{AuthConversation, AuthState};
use crate::Result;

pub(crate) const NAME: &str = "EXTERNAL";

pub(crate) fn server_data(conv: &mut AuthConversation, data: &[u8]) -> Result<()> {
    if conv.credentials.is_anonymous() {
        debug!("server: transport reported no credentials, EXTERNAL cannot work");
        return conv.send_rejected();
    }

    if !data.is_empty() {
        if !conv.identity.is_empty() {
            debug!("server: client sent a second identity");
            return conv.send_rejected();
        }
        conv.identity = data.to_vec();
    }

    // Poke the client once with an empty challenge if it never said
    // who it wants to be.
    if conv.identity.is_empty() && !conv.already_asked_for_initial_response {
        conv.send_data(&[])?;
        debug!("server: asking client for an identity");
        conv.already_asked_for_initial_response = true;
        conv.goto_state(AuthState::ServerWaitingForData);
        return Ok(());
    }

    conv.desired_identity.clear();

    if conv.identity.is_empty() {
        // Empty after the poke: "whoever the transport says I am"
        conv.desired_identity = conv.credentials.clone();
    } else {
        let parsed = std::str::from_utf8(&conv.identity)
            .ok()
            .and_then(|text| Credentials::from_uid_text(text).ok());
        match parsed {
            Some(creds) => conv.desired_identity = creds,
            None => {
                debug!("server: could not parse a uid out of the client's identity");
                return conv.send_rejected();
            }
        }
    }

    if conv.desired_identity.is_anonymous() {
        debug!("server: desired identity names no user");
        return conv.send_rejected();
    }

    if !conv.credentials.is_superset_of(&conv.desired_identity) {
        debug!(
            "server: transport credentials do not vouch for uid {:?}",
            conv.desired_identity.unix_uid()
        );
        return conv.send_rejected();
    }

    // The transport vouches for these facts, carry them over
    let mut authorized = conv.desired_identity.clone();
    if let Some(pid) = conv.credentials.pid() {
        authorized.set_pid(pid);
    }
    if let Some(gids) = conv.credentials.unix_gids() {
        authorized.set_unix_gids(gids.to_vec());
    }
    if let Some(label) = conv.credentials.linux_security_label() {
        authorized.set_linux_security_label(label.to_string());
    }
    if let Some(audit) = conv.credentials.adt_audit_data() {
        authorized.set_adt_audit_data(audit.to_vec());
    }
    conv.authorized_identity = authorized;

    conv.send_ok()?;
    debug!("server: authenticated client from transport credentials");
    Ok(())
}

pub(crate) fn client_initial_response(conv: &mut AuthConversation) -> Result<Vec<u8>> {
    match conv.credentials.unix_uid() {
        Some(uid) => {
            conv.desired_identity = Credentials::for_uid(uid);
            Ok(uid.to_string().into_bytes())
        }
        None => {
            // No uid to assert; an empty response defers to whatever
            // the transport reports about us.
            conv.desired_identity = conv.credentials.clone();
            Ok(Vec::new())
        }
    }
}

pub(crate) fn client_data(conv: &mut AuthConversation, _data: &[u8]) -> Result<()> {
    // The identity went out with AUTH, so any challenge here is the
    // server poking for one; an empty reply means "ask the transport".
    conv.send_data(&[])
}
