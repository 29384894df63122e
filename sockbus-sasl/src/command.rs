//! Wire grammar for handshake lines
//!
//! Every message is one ASCII line terminated by `\r\n`. The first
//! blank-delimited token names the command and is matched
//! case-sensitively; whatever follows the blanks is the argument text,
//! left for the per-command handlers to interpret.

/// Line terminator for every handshake message
pub const LINE_END: &[u8] = b"\r\n";

/// The command vocabulary. Anything unrecognized parses as `Unknown`
/// so the state machine can answer it instead of stalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Auth,
    Cancel,
    Data,
    Begin,
    Rejected,
    Ok,
    Error,
    NegotiateUnixFd,
    AgreeUnixFd,
    Unknown,
}

impl Command {
    /// Match a command token. Case-sensitive: `auth` is not `AUTH`.
    pub fn lookup(token: &[u8]) -> Command {
        match token {
            b"AUTH" => Command::Auth,
            b"CANCEL" => Command::Cancel,
            b"DATA" => Command::Data,
            b"BEGIN" => Command::Begin,
            b"REJECTED" => Command::Rejected,
            b"OK" => Command::Ok,
            b"ERROR" => Command::Error,
            b"NEGOTIATE_UNIX_FD" => Command::NegotiateUnixFd,
            b"AGREE_UNIX_FD" => Command::AgreeUnixFd,
            _ => Command::Unknown,
        }
    }
}

/// Offset of the first `\r\n` in `buf`, if a complete line is buffered
pub(crate) fn find_line_end(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|window| window == LINE_END)
}

/// True when the line can be parsed at all: 7-bit ASCII, no NUL
pub(crate) fn is_clean_ascii(line: &[u8]) -> bool {
    line.iter().all(|&b| b != 0 && b.is_ascii())
}

fn is_blank(byte: &u8) -> bool {
    matches!(byte, b' ' | b'\t')
}

/// Split off the first blank-delimited token; the remainder starts at
/// the first non-blank byte after it. Missing token or remainder come
/// back empty rather than as errors.
pub(crate) fn next_token(bytes: &[u8]) -> (&[u8], &[u8]) {
    let end = bytes.iter().position(is_blank).unwrap_or(bytes.len());
    let (token, rest) = bytes.split_at(end);
    let start = rest.iter().position(|b| !is_blank(b)).unwrap_or(rest.len());
    (token, &rest[start..])
}

/// Parse one complete line (terminator already stripped) into its
/// command and argument text.
pub(crate) fn split_command(line: &[u8]) -> (Command, &[u8]) {
    let (token, args) = next_token(line);
    (Command::lookup(token), args)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_sensitive() {
        assert_eq!(Command::lookup(b"AUTH"), Command::Auth);
        assert_eq!(Command::lookup(b"auth"), Command::Unknown);
        assert_eq!(Command::lookup(b"Begin"), Command::Unknown);
        assert_eq!(Command::lookup(b"NEGOTIATE_UNIX_FD"), Command::NegotiateUnixFd);
        assert_eq!(Command::lookup(b""), Command::Unknown);
    }

    #[test]
    fn test_split_command_takes_first_token() {
        let (cmd, args) = split_command(b"AUTH EXTERNAL 31303030");
        assert_eq!(cmd, Command::Auth);
        assert_eq!(args, b"EXTERNAL 31303030");

        let (cmd, args) = split_command(b"BEGIN");
        assert_eq!(cmd, Command::Begin);
        assert_eq!(args, b"");
    }

    #[test]
    fn test_split_command_skips_blank_runs() {
        let (cmd, args) = split_command(b"DATA \t 68656c6c6f");
        assert_eq!(cmd, Command::Data);
        assert_eq!(args, b"68656c6c6f");

        // A trailing blank leaves empty args, not a phantom token
        let (cmd, args) = split_command(b"AUTH ");
        assert_eq!(cmd, Command::Auth);
        assert_eq!(args, b"");
    }

    #[test]
    fn test_next_token_without_blank() {
        let (token, rest) = next_token(b"EXTERNAL");
        assert_eq!(token, b"EXTERNAL");
        assert_eq!(rest, b"");
    }

    #[test]
    fn test_find_line_end() {
        assert_eq!(find_line_end(b"AUTH\r\nrest"), Some(4));
        assert_eq!(find_line_end(b"\r\n"), Some(0));
        assert_eq!(find_line_end(b"no terminator"), None);
        // A bare newline is not a line ending
        assert_eq!(find_line_end(b"AUTH\nBEGIN"), None);
    }

    #[test]
    fn test_clean_ascii() {
        assert!(is_clean_ascii(b"OK 1234abcd"));
        assert!(is_clean_ascii(b""));
        assert!(!is_clean_ascii(b"caf\xc3\xa9"));
        assert!(!is_clean_ascii(b"nul\0byte"));
    }
}
