//! In-memory handshake walkthrough
//!
//! Wires a client and a server conversation back to back and prints
//! every line they exchange: once over EXTERNAL, once over the cookie
//! mechanism against a throwaway keyring directory.
//!
//! Run with `RUST_LOG=sockbus_sasl=trace` to watch the state machine.

use sockbus_core::{Credentials, Guid};
use sockbus_sasl::AuthConversation;

fn print_lines(direction: &str, bytes: &[u8]) {
    for line in String::from_utf8_lossy(bytes).split("\r\n") {
        if !line.is_empty() {
            println!("{direction}  {line}");
        }
    }
}

fn pump(client: &mut AuthConversation, server: &mut AuthConversation) {
    let mut client_status = client.advance();
    let mut server_status = server.advance();

    loop {
        let mut delivered = false;

        let out = client.take_output();
        if !out.is_empty() {
            print_lines("C -> S", &out);
            server.push_input(&out).expect("server buffer");
            delivered = true;
        }

        let out = server.take_output();
        if !out.is_empty() {
            print_lines("S -> C", &out);
            client.push_input(&out).expect("client buffer");
            delivered = true;
        }

        if !delivered {
            break;
        }
        client_status = client.advance();
        server_status = server.advance();
    }

    println!("client finished {client_status:?}, server finished {server_status:?}");
}

fn main() {
    tracing_subscriber::fmt::init();

    println!("== EXTERNAL ==");
    let mut client = AuthConversation::new_client(Credentials::for_uid(1000));
    let mut server =
        AuthConversation::new_server(Guid::generate(), Credentials::for_uid(1000));
    pump(&mut client, &mut server);
    println!("server authorized: {:?}", server.identity());

    println!();
    println!("== DBUS_COOKIE_SHA1 ==");
    let keyring_root = tempfile::tempdir().expect("tempdir");
    let me = Credentials::of_current_process();
    let mut client = AuthConversation::new_client(me.clone());
    let mut server = AuthConversation::new_server(Guid::generate(), me);
    server.set_allowed_mechanisms(&["DBUS_COOKIE_SHA1"]);
    client.set_keyring_root(keyring_root.path().join("keyrings"));
    server.set_keyring_root(keyring_root.path().join("keyrings"));
    pump(&mut client, &mut server);
    println!("server authorized: {:?}", server.identity());
}
