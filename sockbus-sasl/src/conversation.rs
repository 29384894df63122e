//! The handshake state machine
//!
//! One [`AuthConversation`] drives one side of one connection. It is
//! sans-io: the owner pushes received bytes in, pumps [`advance`], and
//! ships whatever [`take_output`] yields. Commands are handled per
//! `(state, command)` pair; mechanism-specific work is delegated to the
//! slots in [`crate::mech::MECHANISMS`].
//!
//! [`advance`]: AuthConversation::advance
//! [`take_output`]: AuthConversation::take_output

use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::{debug, trace, warn};
use zeroize::Zeroizing;

use sockbus_core::{Context, Credentials, Guid, Sha1};
use sockbus_keyring::Keyring;

use crate::command::{find_line_end, is_clean_ascii, next_token, split_command, Command};
use crate::limits::{DEFAULT_MAX_FAILURES, MAX_BUFFER_LEN};
use crate::mech::{find_mechanism, Mechanism, MECHANISMS};
use crate::{AuthError, Result};

/// Which end of the connection a conversation speaks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Where the handshake stands. `Authenticated` and `NeedDisconnect`
/// are terminal; no command moves a conversation out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    /// Client that still owes the peer its opening `AUTH`. Only
    /// reachable when queueing it at construction failed.
    ClientNeedSendAuth,
    /// Client waiting for the server's verdict or next challenge
    ClientWaitingForData,
    /// Client sent `CANCEL` and expects a `REJECTED`
    ClientWaitingForReject,
    /// Client asked for unix fd passing and awaits the answer
    ClientWaitingForAgreeUnixFd,
    /// Server waiting for a client to pick a mechanism
    ServerWaitingForAuth,
    /// Server waiting for the client's answer to a challenge
    ServerWaitingForData,
    /// Server accepted the client and waits for `BEGIN`
    ServerWaitingForBegin,
    /// Terminal success
    Authenticated,
    /// Terminal failure; the owner should drop the connection
    NeedDisconnect,
}

impl AuthState {
    fn is_terminal(self) -> bool {
        matches!(self, AuthState::Authenticated | AuthState::NeedDisconnect)
    }
}

/// What the connection owner should do after a call to
/// [`AuthConversation::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum AuthStatus {
    /// Nothing to do until the peer sends more bytes
    NeedMoreInput,
    /// Bytes are queued; ship [`AuthConversation::take_output`]
    HaveOutput,
    /// The handshake succeeded
    Authenticated,
    /// The handshake failed; drop the connection
    NeedDisconnect,
    /// An allocation failed. No input was lost; retry `advance` once
    /// memory pressure eases.
    NeedMoreResources,
}

/// Per-role state kept out of the shared struct so neither side can
/// touch the other's bookkeeping.
enum SideState {
    Client {
        /// Mechanisms still worth an `AUTH`, front first
        mechs_to_try: VecDeque<&'static Mechanism>,
        /// The server's mechanism list is recorded only once
        already_got_mechanisms: bool,
        guid_from_server: Option<Guid>,
    },
    Server {
        guid: Guid,
        failures: u32,
        max_failures: u32,
    },
}

/// One side of one connection's authentication handshake
pub struct AuthConversation {
    side: SideState,
    state: AuthState,
    incoming: Vec<u8>,
    outgoing: Vec<u8>,
    /// Active mechanism; survives into `Authenticated` so the
    /// encode/decode hooks can reach its codec slots
    mech: Option<&'static Mechanism>,
    /// This side's own credentials (client) or the peer credentials
    /// the transport reported (server)
    pub(crate) credentials: Credentials,
    /// Raw identity bytes the peer asserted in the current attempt
    pub(crate) identity: Vec<u8>,
    /// Parsed form of what the peer wants to be
    pub(crate) desired_identity: Credentials,
    /// What has actually been proven; empty until `OK`
    pub(crate) authorized_identity: Credentials,
    /// Cookie keyring context (servers advertise it, clients follow
    /// whatever the server names)
    pub(crate) context: Context,
    pub(crate) keyring: Option<Keyring>,
    /// Cookie the server challenged with, none before the first round
    pub(crate) cookie_id: Option<u32>,
    /// Server's outstanding hex challenge text
    pub(crate) challenge: String,
    allowed_mechanisms: Option<Vec<String>>,
    pub(crate) already_asked_for_initial_response: bool,
    unix_fd_possible: bool,
    unix_fd_negotiated: bool,
    /// Override for the keyring directory, mainly for tests and
    /// embedders with their own state directory
    keyring_root: Option<PathBuf>,
}

impl AuthConversation {
    fn with_side(side: SideState, state: AuthState, credentials: Credentials) -> Self {
        AuthConversation {
            side,
            state,
            incoming: Vec::new(),
            outgoing: Vec::new(),
            mech: None,
            credentials,
            identity: Vec::new(),
            desired_identity: Credentials::new(),
            authorized_identity: Credentials::new(),
            context: Context::default(),
            keyring: None,
            cookie_id: None,
            challenge: String::new(),
            allowed_mechanisms: None,
            already_asked_for_initial_response: false,
            unix_fd_possible: false,
            unix_fd_negotiated: false,
            keyring_root: None,
        }
    }

    /// Client side of a handshake. `own_credentials` is the identity
    /// this process will assert; the opening `AUTH` is queued
    /// immediately.
    pub fn new_client(own_credentials: Credentials) -> Self {
        let mut conversation = Self::with_side(
            SideState::Client {
                mechs_to_try: VecDeque::new(),
                already_got_mechanisms: false,
                guid_from_server: None,
            },
            AuthState::ClientNeedSendAuth,
            own_credentials,
        );
        // Entry action; advance() retries it if this enqueue failed
        if conversation.client_start().is_err() {
            debug!("client: could not queue the opening AUTH, will retry");
        }
        conversation
    }

    /// Server side of a handshake. `guid` identifies this server to
    /// clients; `transport_credentials` is whatever the transport
    /// could prove about the peer (possibly nothing).
    pub fn new_server(guid: Guid, transport_credentials: Credentials) -> Self {
        Self::with_side(
            SideState::Server {
                guid,
                failures: 0,
                max_failures: DEFAULT_MAX_FAILURES,
            },
            AuthState::ServerWaitingForAuth,
            transport_credentials,
        )
    }

    /// Which end this conversation speaks for
    pub fn role(&self) -> Role {
        match self.side {
            SideState::Client { .. } => Role::Client,
            SideState::Server { .. } => Role::Server,
        }
    }

    fn role_name(&self) -> &'static str {
        match self.role() {
            Role::Client => "client",
            Role::Server => "server",
        }
    }

    /// Current state, mostly useful for tests and diagnostics
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Append bytes received from the peer
    pub fn push_input(&mut self, bytes: &[u8]) -> Result<()> {
        self.incoming.try_reserve(bytes.len())?;
        self.incoming.extend_from_slice(bytes);
        Ok(())
    }

    /// Drain everything queued for the peer
    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.outgoing)
    }

    /// Bytes that arrived after the line that ended the handshake.
    /// They belong to the post-auth stream and were never inspected.
    /// Empty until the conversation reaches a terminal state.
    pub fn take_unused_input(&mut self) -> Vec<u8> {
        if self.state.is_terminal() {
            std::mem::take(&mut self.incoming)
        } else {
            Vec::new()
        }
    }

    /// The proven peer identity. Empty until `Authenticated`.
    pub fn identity(&self) -> Credentials {
        if self.state == AuthState::Authenticated {
            self.authorized_identity.clone()
        } else {
            Credentials::new()
        }
    }

    /// Server guid: own on the server, learned from `OK` on the client
    pub fn guid(&self) -> Option<&Guid> {
        match &self.side {
            SideState::Server { guid, .. } => Some(guid),
            SideState::Client { guid_from_server, .. } => guid_from_server.as_ref(),
        }
    }

    /// True once both sides agreed to pass unix fds
    pub fn unix_fd_negotiated(&self) -> bool {
        self.unix_fd_negotiated
    }

    /// Cookie keyring context servers will challenge with
    pub fn set_context(&mut self, context: Context) {
        self.context = context;
    }

    /// Restrict the conversation to the named mechanisms. Unknown
    /// names are kept in the list but will never resolve.
    pub fn set_allowed_mechanisms(&mut self, names: &[&str]) {
        self.allowed_mechanisms = Some(names.iter().map(|n| n.to_string()).collect());
    }

    /// Rejections a server tolerates before disconnecting. No effect
    /// on a client conversation.
    pub fn set_max_failures(&mut self, limit: u32) {
        if let SideState::Server { max_failures, .. } = &mut self.side {
            *max_failures = limit;
        }
    }

    /// Whether the transport could carry unix fds. Servers agree to
    /// `NEGOTIATE_UNIX_FD` only when set; clients ask only when set.
    pub fn set_unix_fd_possible(&mut self, possible: bool) {
        self.unix_fd_possible = possible;
    }

    /// Keep cookie keyrings under `root` instead of the user's home
    pub fn set_keyring_root(&mut self, root: impl Into<PathBuf>) {
        self.keyring_root = Some(root.into());
    }

    /// Run the state machine over the buffered input until no complete
    /// line remains or the conversation cannot continue. Pending output
    /// always wins the returned status so the owner flushes before
    /// acting on anything else.
    pub fn advance(&mut self) -> AuthStatus {
        let mut needed_resources = false;

        loop {
            if self.state.is_terminal() {
                break;
            }

            if self.state == AuthState::ClientNeedSendAuth {
                // Entry action deferred from construction
                if self.client_start().is_err() {
                    needed_resources = true;
                    break;
                }
                continue;
            }

            if self.incoming.len() > MAX_BUFFER_LEN || self.outgoing.len() > MAX_BUFFER_LEN {
                warn!(
                    "{}: peer pushed a buffer past {} bytes, disconnecting",
                    self.role_name(),
                    MAX_BUFFER_LEN
                );
                self.goto_state(AuthState::NeedDisconnect);
                break;
            }

            match self.process_command() {
                Ok(true) => {}
                Ok(false) => break,
                Err(_) => {
                    needed_resources = true;
                    break;
                }
            }
        }

        if needed_resources {
            AuthStatus::NeedMoreResources
        } else if !self.outgoing.is_empty() {
            AuthStatus::HaveOutput
        } else if self.state == AuthState::NeedDisconnect {
            AuthStatus::NeedDisconnect
        } else if self.state == AuthState::Authenticated {
            AuthStatus::Authenticated
        } else {
            AuthStatus::NeedMoreInput
        }
    }

    /// Handle one complete line, if one is buffered. The line is
    /// drained only after its handler succeeded, so an allocation
    /// failure never loses input.
    fn process_command(&mut self) -> Result<bool> {
        let Some(eol) = find_line_end(&self.incoming) else {
            return Ok(false);
        };

        let mut line = Vec::new();
        line.try_reserve(eol)?;
        line.extend_from_slice(&self.incoming[..eol]);

        if !is_clean_ascii(&line) {
            trace!("{}: line contained non-ASCII or NUL bytes", self.role_name());
            self.send_error("Command contained non-ASCII")?;
        } else {
            let (command, args) = split_command(&line);
            trace!("{}: handling {:?} in {:?}", self.role_name(), command, self.state);
            self.dispatch(command, args)?;
        }

        self.incoming.drain(..eol + 2);
        Ok(true)
    }

    fn dispatch(&mut self, command: Command, args: &[u8]) -> Result<()> {
        match self.state {
            AuthState::ServerWaitingForAuth => self.server_waiting_for_auth(command, args),
            AuthState::ServerWaitingForData => self.server_waiting_for_data(command, args),
            AuthState::ServerWaitingForBegin => self.server_waiting_for_begin(command, args),
            AuthState::ClientWaitingForData => self.client_waiting_for_data(command, args),
            AuthState::ClientWaitingForReject => self.client_waiting_for_reject(command, args),
            AuthState::ClientWaitingForAgreeUnixFd => {
                self.client_waiting_for_agree_unix_fd(command)
            }
            AuthState::ClientNeedSendAuth | AuthState::Authenticated | AuthState::NeedDisconnect => {
                // advance() never dispatches in these states
                debug_assert!(false, "dispatch in {:?}", self.state);
                Ok(())
            }
        }
    }

    // ---- server states ----

    fn server_waiting_for_auth(&mut self, command: Command, args: &[u8]) -> Result<()> {
        match command {
            Command::Auth => self.handle_auth(args),
            Command::Cancel | Command::Error => self.send_rejected(),
            Command::Begin => {
                // BEGIN before authenticating; no answer is owed
                self.goto_state(AuthState::NeedDisconnect);
                Ok(())
            }
            _ => self.send_error("Unknown command"),
        }
    }

    fn server_waiting_for_data(&mut self, command: Command, args: &[u8]) -> Result<()> {
        match command {
            Command::Data => {
                let decoded = match hex::decode(args) {
                    Ok(bytes) => bytes,
                    Err(_) => return self.send_error("Invalid hex encoding"),
                };
                match self.mech {
                    Some(mech) => (mech.server_data)(self, &decoded),
                    None => self.send_error("Not currently in an auth conversation"),
                }
            }
            Command::Cancel | Command::Error => self.send_rejected(),
            Command::Begin => {
                self.goto_state(AuthState::NeedDisconnect);
                Ok(())
            }
            Command::Auth => self.send_error("Sent AUTH while another AUTH in progress"),
            _ => self.send_error("Unknown command"),
        }
    }

    fn server_waiting_for_begin(&mut self, command: Command, args: &[u8]) -> Result<()> {
        match command {
            Command::Begin => {
                if args.is_empty() {
                    self.goto_state(AuthState::Authenticated);
                    Ok(())
                } else {
                    self.send_error("Data given to BEGIN command")
                }
            }
            Command::NegotiateUnixFd => {
                if self.unix_fd_possible {
                    self.unix_fd_negotiated = true;
                    debug!("server: agreed to unix fd passing");
                    self.enqueue_line("AGREE_UNIX_FD")
                } else {
                    self.send_error("Unix fd passing not offered on this transport")
                }
            }
            Command::Auth => self.send_error("Sent AUTH while expecting BEGIN"),
            Command::Data => self.send_error("Sent DATA while expecting BEGIN"),
            _ => self.send_error("Unknown command"),
        }
    }

    /// `AUTH [mechanism [hex-initial-response]]`
    fn handle_auth(&mut self, args: &[u8]) -> Result<()> {
        if args.is_empty() {
            // Bare AUTH asks which mechanisms we speak
            return self.send_rejected();
        }

        let (name, hex_response) = next_token(args);
        let Some(mech) = find_mechanism(name, self.allowed_mechanisms.as_deref()) else {
            debug!(
                "server: unsupported mechanism {}",
                String::from_utf8_lossy(name)
            );
            return self.send_rejected();
        };

        let decoded = match hex::decode(hex_response) {
            Ok(bytes) => bytes,
            Err(_) => return self.send_error("Invalid hex encoding"),
        };

        trace!("server: trying mechanism {}", mech.name);
        self.mech = Some(mech);
        (mech.server_data)(self, &decoded)
    }

    // ---- client states ----

    fn client_waiting_for_data(&mut self, command: Command, args: &[u8]) -> Result<()> {
        match command {
            Command::Data => {
                let decoded = match hex::decode(args) {
                    Ok(bytes) => bytes,
                    Err(_) => return self.send_error("Invalid hex encoding"),
                };
                match self.mech {
                    Some(mech) => (mech.client_data)(self, &decoded),
                    None => self.send_error("Not currently in an auth conversation"),
                }
            }
            Command::Rejected => self.process_rejected(args),
            Command::Ok => self.process_ok(args),
            Command::Error => self.send_cancel(),
            _ => self.send_error("Unknown command"),
        }
    }

    fn client_waiting_for_reject(&mut self, command: Command, args: &[u8]) -> Result<()> {
        match command {
            Command::Rejected => self.process_rejected(args),
            _ => {
                debug!("client: expected REJECTED after CANCEL, giving up");
                self.goto_state(AuthState::NeedDisconnect);
                Ok(())
            }
        }
    }

    fn client_waiting_for_agree_unix_fd(&mut self, command: Command) -> Result<()> {
        match command {
            Command::AgreeUnixFd => {
                self.unix_fd_negotiated = true;
                debug!("client: unix fd passing agreed");
                self.send_begin()
            }
            Command::Error => {
                self.unix_fd_negotiated = false;
                debug!("client: unix fd passing declined by the server");
                self.send_begin()
            }
            _ => self.send_error("Unknown command"),
        }
    }

    /// Queue the opening `AUTH` for the first allowed mechanism
    fn client_start(&mut self) -> Result<()> {
        let first = MECHANISMS
            .iter()
            .find(|mech| self.mechanism_allowed(mech.name));
        match first {
            Some(mech) => self.send_auth(mech),
            None => {
                debug!("client: the allow-list leaves no mechanism to offer");
                self.goto_state(AuthState::NeedDisconnect);
                Ok(())
            }
        }
    }

    /// `AUTH <name> [hex-initial-response]`, then wait for the verdict
    fn send_auth(&mut self, mech: &'static Mechanism) -> Result<()> {
        self.shutdown_mech();

        let mut line = String::from("AUTH ");
        line.push_str(mech.name);
        if let Some(build) = mech.client_initial_response {
            let response = build(self)?;
            line.push(' ');
            line.push_str(&hex::encode(&response));
        }
        self.enqueue_line(&line)?;

        self.mech = Some(mech);
        self.goto_state(AuthState::ClientWaitingForData);
        Ok(())
    }

    /// Remember which of the server's mechanisms are still worth an
    /// attempt. Later `REJECTED` lists are ignored so retries cannot
    /// grow the queue, and the attempt the server just turned down is
    /// never queued again.
    fn record_mechanisms(&mut self, args: &[u8]) {
        if matches!(
            &self.side,
            SideState::Client { already_got_mechanisms: true, .. }
        ) {
            return;
        }

        let rejected = self.mech;
        let usable: Vec<&'static Mechanism> = args
            .split(|&b| b == b' ' || b == b'\t')
            .filter(|token| !token.is_empty())
            .filter_map(|token| {
                let mech = find_mechanism(token, self.allowed_mechanisms.as_deref());
                if mech.is_none() {
                    trace!(
                        "client: ignoring unusable mechanism {}",
                        String::from_utf8_lossy(token)
                    );
                }
                mech
            })
            .filter(|mech| {
                let already_tried =
                    rejected.is_some_and(|active| active.name == mech.name);
                if already_tried {
                    trace!("client: not retrying mechanism {}", mech.name);
                }
                !already_tried
            })
            .collect();

        if let SideState::Client {
            mechs_to_try,
            already_got_mechanisms,
            ..
        } = &mut self.side
        {
            for mech in usable {
                debug!("client: will try mechanism {} if needed", mech.name);
                mechs_to_try.push_back(mech);
            }
            *already_got_mechanisms = true;
        }
    }

    /// The server said no; move on to the next candidate or give up
    fn process_rejected(&mut self, args: &[u8]) -> Result<()> {
        self.record_mechanisms(args);

        let next = match &self.side {
            SideState::Client { mechs_to_try, .. } => mechs_to_try.front().copied(),
            SideState::Server { .. } => None,
        };
        match next {
            Some(mech) => {
                debug!("client: trying mechanism {}", mech.name);
                self.send_auth(mech)?;
                // Popped only once the AUTH is actually queued
                if let SideState::Client { mechs_to_try, .. } = &mut self.side {
                    mechs_to_try.pop_front();
                }
                Ok(())
            }
            None => {
                debug!("client: out of mechanisms to try, disconnecting");
                self.goto_state(AuthState::NeedDisconnect);
                Ok(())
            }
        }
    }

    /// `OK <hex-guid>`: the server accepted us
    fn process_ok(&mut self, args: &[u8]) -> Result<()> {
        let guid = std::str::from_utf8(args)
            .ok()
            .and_then(|text| Guid::from_hex(text).ok());
        let Some(guid) = guid else {
            debug!("client: server sent a malformed guid, disconnecting");
            self.goto_state(AuthState::NeedDisconnect);
            return Ok(());
        };

        debug!("client: learned server guid {}", guid);
        if let SideState::Client { guid_from_server, .. } = &mut self.side {
            *guid_from_server = Some(guid);
        }

        // What we set out to be is now what we are
        self.authorized_identity.merge(&self.desired_identity);

        if self.unix_fd_possible {
            self.send_negotiate_unix_fd()
        } else {
            self.send_begin()
        }
    }

    // ---- outgoing helpers ----

    fn enqueue_line(&mut self, line: &str) -> Result<()> {
        self.outgoing.try_reserve(line.len() + 2)?;
        self.outgoing.extend_from_slice(line.as_bytes());
        self.outgoing.extend_from_slice(b"\r\n");
        Ok(())
    }

    /// `DATA [hex-payload]`; an empty payload is a bare `DATA`
    pub(crate) fn send_data(&mut self, payload: &[u8]) -> Result<()> {
        if payload.is_empty() {
            self.enqueue_line("DATA")
        } else {
            let mut line = String::with_capacity(5 + payload.len() * 2);
            line.push_str("DATA ");
            line.push_str(&hex::encode(payload));
            self.enqueue_line(&line)
        }
    }

    /// `ERROR "<message>"`; never changes state by itself
    pub(crate) fn send_error(&mut self, message: &str) -> Result<()> {
        trace!("{}: answering with error: {}", self.role_name(), message);
        self.enqueue_line(&format!("ERROR \"{message}\""))
    }

    /// Server accepts the current attempt: `OK <hex-guid>`
    pub(crate) fn send_ok(&mut self) -> Result<()> {
        let SideState::Server { guid, .. } = &self.side else {
            debug_assert!(false, "send_ok on a client conversation");
            return Ok(());
        };
        let line = format!("OK {guid}");
        self.enqueue_line(&line)?;
        self.goto_state(AuthState::ServerWaitingForBegin);
        Ok(())
    }

    /// Server refuses the current attempt and advertises what it
    /// speaks. Ends the connection once the failure budget is spent.
    pub(crate) fn send_rejected(&mut self) -> Result<()> {
        let mut line = String::from("REJECTED");
        for name in MECHANISMS.iter().map(|mech| mech.name) {
            if self.mechanism_allowed(name) {
                line.push(' ');
                line.push_str(name);
            }
        }
        self.enqueue_line(&line)?;
        self.shutdown_mech();

        let over_budget = match &mut self.side {
            SideState::Server {
                failures,
                max_failures,
                ..
            } => {
                *failures += 1;
                *failures >= *max_failures
            }
            SideState::Client { .. } => {
                debug_assert!(false, "send_rejected on a client conversation");
                false
            }
        };
        if over_budget {
            debug!("server: too many failed attempts, disconnecting");
            self.goto_state(AuthState::NeedDisconnect);
        } else {
            self.goto_state(AuthState::ServerWaitingForAuth);
        }
        Ok(())
    }

    fn send_cancel(&mut self) -> Result<()> {
        self.enqueue_line("CANCEL")?;
        self.goto_state(AuthState::ClientWaitingForReject);
        Ok(())
    }

    fn send_negotiate_unix_fd(&mut self) -> Result<()> {
        self.enqueue_line("NEGOTIATE_UNIX_FD")?;
        self.goto_state(AuthState::ClientWaitingForAgreeUnixFd);
        Ok(())
    }

    fn send_begin(&mut self) -> Result<()> {
        self.enqueue_line("BEGIN")?;
        self.goto_state(AuthState::Authenticated);
        Ok(())
    }

    // ---- shared internals ----

    fn mechanism_allowed(&self, name: &str) -> bool {
        match &self.allowed_mechanisms {
            Some(allowed) => allowed.iter().any(|entry| entry == name),
            None => true,
        }
    }

    pub(crate) fn goto_state(&mut self, next: AuthState) {
        trace!("{}: {:?} -> {:?}", self.role_name(), self.state, next);
        self.state = next;
    }

    /// Clear every per-attempt scrap of state and give the active
    /// mechanism its shutdown callback.
    fn shutdown_mech(&mut self) {
        self.already_asked_for_initial_response = false;
        self.identity.clear();
        self.desired_identity.clear();
        self.authorized_identity.clear();
        if let Some(mech) = self.mech.take() {
            trace!("{}: shutting down mechanism {}", self.role_name(), mech.name);
            let shutdown = match self.role() {
                Role::Client => mech.client_shutdown,
                Role::Server => mech.server_shutdown,
            };
            if let Some(run) = shutdown {
                run(self);
            }
        }
    }

    /// Open the keyring for `(owner, context)`, reusing the cached one
    /// when it still matches, and return a fresh cookie id.
    pub(crate) fn mint_cookie(
        &mut self,
        owner: &Credentials,
        context: &Context,
    ) -> sockbus_keyring::Result<u32> {
        let mut keyring = match self.keyring.take() {
            Some(k) if k.is_for(owner) && k.context() == context => k,
            _ => self.open_keyring(owner, context)?,
        };
        let minted = keyring.best_key();
        self.keyring = Some(keyring);
        minted
    }

    /// Same reuse rule as [`Self::mint_cookie`], without touching keys
    pub(crate) fn ensure_keyring(
        &mut self,
        owner: &Credentials,
        context: &Context,
    ) -> sockbus_keyring::Result<()> {
        let keyring = match self.keyring.take() {
            Some(k) if k.is_for(owner) && k.context() == context => k,
            _ => self.open_keyring(owner, context)?,
        };
        self.keyring = Some(keyring);
        Ok(())
    }

    fn open_keyring(
        &self,
        owner: &Credentials,
        context: &Context,
    ) -> sockbus_keyring::Result<Keyring> {
        match &self.keyring_root {
            Some(root) => Keyring::load_in(root, owner, context),
            None => Keyring::load(owner, context),
        }
    }

    /// Hex SHA-1 of `server-challenge:client-challenge:secret`, all in
    /// their hex text forms. Empty when the cookie cannot be found,
    /// which callers treat as "no proof possible".
    pub(crate) fn cookie_proof(
        &self,
        cookie_id: u32,
        server_challenge: &[u8],
        client_challenge: &[u8],
    ) -> String {
        let Some(keyring) = &self.keyring else {
            return String::new();
        };
        let secret = keyring.hex_secret(cookie_id);
        if secret.is_empty() {
            return String::new();
        }

        let mut to_hash = Zeroizing::new(Vec::with_capacity(
            server_challenge.len() + client_challenge.len() + secret.len() + 2,
        ));
        to_hash.extend_from_slice(server_challenge);
        to_hash.push(b':');
        to_hash.extend_from_slice(client_challenge);
        to_hash.push(b':');
        to_hash.extend_from_slice(secret.as_bytes());
        Sha1::digest_hex(&to_hash)
    }

    // ---- post-auth codec hooks ----

    fn encode_slot(&self) -> Option<crate::mech::CodecFn> {
        self.mech.and_then(|mech| match self.role() {
            Role::Client => mech.client_encode,
            Role::Server => mech.server_encode,
        })
    }

    fn decode_slot(&self) -> Option<crate::mech::CodecFn> {
        self.mech.and_then(|mech| match self.role() {
            Role::Client => mech.client_decode,
            Role::Server => mech.server_decode,
        })
    }

    /// True when outgoing post-auth bytes must pass through
    /// [`Self::encode`] before hitting the transport.
    pub fn needs_encoding(&self) -> bool {
        self.state == AuthState::Authenticated && self.encode_slot().is_some()
    }

    /// True when received post-auth bytes must pass through
    /// [`Self::decode`].
    pub fn needs_decoding(&self) -> bool {
        self.state == AuthState::Authenticated && self.decode_slot().is_some()
    }

    /// Transform outgoing post-auth bytes. A plain copy unless the
    /// mechanism negotiated a codec.
    pub fn encode(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if self.state != AuthState::Authenticated {
            return Err(AuthError::NotAuthenticated);
        }
        let mut encoded = Vec::new();
        match self.encode_slot() {
            Some(run) => run(self, plaintext, &mut encoded)?,
            None => {
                encoded.try_reserve(plaintext.len())?;
                encoded.extend_from_slice(plaintext);
            }
        }
        Ok(encoded)
    }

    /// Transform received post-auth bytes. A plain copy unless the
    /// mechanism negotiated a codec.
    pub fn decode(&mut self, received: &[u8]) -> Result<Vec<u8>> {
        if self.state != AuthState::Authenticated {
            return Err(AuthError::NotAuthenticated);
        }
        let mut decoded = Vec::new();
        match self.decode_slot() {
            Some(run) => run(self, received, &mut decoded)?,
            None => {
                decoded.try_reserve(received.len())?;
                decoded.extend_from_slice(received);
            }
        }
        Ok(decoded)
    }
}

impl Drop for AuthConversation {
    fn drop(&mut self) {
        self.shutdown_mech();
    }
}
