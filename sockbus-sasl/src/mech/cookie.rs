//! DBUS_COOKIE_SHA1: prove access to a shared per-user cookie file
//!
//! The server names a cookie (keyring context plus key id) and a random
//! challenge; the client answers with its own challenge and the SHA-1
//! of `server-challenge:client-challenge:secret`, every field in hex
//! text form. Only a process that can read the user's keyring can
//! produce the digest, so a matching proof establishes "same user as
//! the cookie file's owner" without trusting the transport.

use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;
use tracing::debug;

use sockbus_core::Credentials;

use crate::command::next_token;
use crate::conversation::{AuthConversation, AuthState};
use crate::limits::CHALLENGE_LEN;
use crate::Result;

pub(crate) const NAME: &str = "DBUS_COOKIE_SHA1";

pub(crate) fn server_data(conv: &mut AuthConversation, data: &[u8]) -> Result<()> {
    match conv.cookie_id {
        None => first_client_response(conv, data),
        Some(cookie_id) => second_client_response(conv, cookie_id, data),
    }
}

/// The client opened with its desired uid; answer with a challenge
fn first_client_response(conv: &mut AuthConversation, data: &[u8]) -> Result<()> {
    conv.challenge.clear();

    if !data.is_empty() {
        if !conv.identity.is_empty() {
            debug!("server: client sent a second identity");
            return conv.send_rejected();
        }
        conv.identity = data.to_vec();
    }

    let parsed = std::str::from_utf8(data)
        .ok()
        .and_then(|text| Credentials::from_uid_text(text).ok());
    match parsed {
        Some(creds) => conv.desired_identity = creds,
        None => {
            debug!("server: cookie client did not open with a valid uid");
            return conv.send_rejected();
        }
    }

    // Cookies live in the user's home directory; we can only vouch for
    // our own.
    let myself = Credentials::of_current_process();
    if !myself.same_user(&conv.desired_identity) {
        debug!(
            "server: cookie auth requested for uid {:?}, but this process is uid {:?}",
            conv.desired_identity.unix_uid(),
            myself.unix_uid()
        );
        return conv.send_rejected();
    }

    let owner = conv.desired_identity.clone();
    let context = conv.context.clone();
    let cookie_id = match conv.mint_cookie(&owner, &context) {
        Ok(id) => id,
        Err(e) => {
            debug!("server: cookie keyring unusable: {}", e);
            return conv.send_rejected();
        }
    };

    let mut raw = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut raw);
    conv.challenge = hex::encode(raw);
    conv.cookie_id = Some(cookie_id);

    let payload = format!("{} {} {}", context, cookie_id, conv.challenge);
    conv.send_data(payload.as_bytes())?;
    conv.goto_state(AuthState::ServerWaitingForData);
    Ok(())
}

/// The client answered the challenge; check its proof
fn second_client_response(
    conv: &mut AuthConversation,
    cookie_id: u32,
    data: &[u8],
) -> Result<()> {
    let (client_challenge, client_hash) = next_token(data);
    if client_challenge.is_empty() || client_hash.is_empty() {
        debug!("server: cookie response is missing its challenge or hash");
        return conv.send_rejected();
    }

    let correct = conv.cookie_proof(cookie_id, conv.challenge.as_bytes(), client_challenge);
    if correct.is_empty() {
        // The cookie aged out of the keyring between the two rounds
        debug!("server: offered cookie {} no longer exists", cookie_id);
        return conv.send_rejected();
    }

    if !bool::from(correct.as_bytes().ct_eq(client_hash)) {
        debug!("server: cookie proof mismatch");
        return conv.send_rejected();
    }

    conv.authorized_identity.merge(&conv.desired_identity);
    conv.send_ok()?;
    debug!("server: authenticated client with a shared cookie");
    Ok(())
}

pub(crate) fn server_shutdown(conv: &mut AuthConversation) {
    conv.cookie_id = None;
    conv.challenge.clear();
}

pub(crate) fn client_initial_response(conv: &mut AuthConversation) -> Result<Vec<u8>> {
    match conv.credentials.unix_uid() {
        Some(uid) => {
            conv.desired_identity = Credentials::for_uid(uid);
            Ok(uid.to_string().into_bytes())
        }
        None => {
            conv.desired_identity = conv.credentials.clone();
            Ok(Vec::new())
        }
    }
}

/// Server challenge arrived: `<context> <cookie-id> <hex-challenge>`
pub(crate) fn client_data(conv: &mut AuthConversation, data: &[u8]) -> Result<()> {
    let (context_raw, rest) = next_token(data);
    let (id_raw, server_challenge) = next_token(rest);
    if context_raw.is_empty() || id_raw.is_empty() {
        return conv.send_error("Server did not send context/ID/challenge properly");
    }

    // The context becomes a file name; refuse anything the keyring
    // would not accept.
    let context = std::str::from_utf8(context_raw)
        .ok()
        .and_then(|name| sockbus_core::Context::new(name).ok());
    let Some(context) = context else {
        return conv.send_error("Server sent invalid cookie context");
    };

    let cookie_id = std::str::from_utf8(id_raw)
        .ok()
        .and_then(|text| text.parse::<u32>().ok());
    let Some(cookie_id) = cookie_id else {
        return conv.send_error("Could not parse cookie ID as an integer");
    };

    if server_challenge.is_empty() {
        return conv.send_error("Empty server challenge string");
    }

    let owner = conv.credentials.clone();
    if let Err(e) = conv.ensure_keyring(&owner, &context) {
        debug!("client: could not open the cookie keyring: {}", e);
        return conv.send_error("Could not load cookie file");
    }

    let mut raw = [0u8; CHALLENGE_LEN];
    OsRng.fill_bytes(&mut raw);
    let client_challenge = hex::encode(raw);

    let proof = conv.cookie_proof(cookie_id, server_challenge, client_challenge.as_bytes());
    if proof.is_empty() {
        return conv.send_error("Don't have the requested cookie ID");
    }

    let mut reply = Vec::with_capacity(client_challenge.len() + 1 + proof.len());
    reply.extend_from_slice(client_challenge.as_bytes());
    reply.push(b' ');
    reply.extend_from_slice(proof.as_bytes());
    conv.send_data(&reply)
}
