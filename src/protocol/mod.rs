//! Wire framing: the single command line every inbound connection opens with.

use crate::config::DEFAULT_CLIENT_POOL_SIZE;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

/// The parsed first line of an inbound connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `AUTH <user>:<pass>`
    Auth { username: String, password: String },
    /// `PROXY <user>`
    Proxy { username: String },
    /// Anything else. Carries the raw line, newline included, so it can be
    /// replayed verbatim onto the proxy socket (spec.md §4.6 step 3).
    Public { first_line: Vec<u8> },
    /// A malformed AUTH line. The `AUTH_FAILED …` reply has already been
    /// written; the caller's only remaining job is to drop the socket.
    Rejected,
}

/// Why a command line failed to parse as AUTH or PROXY.
///
/// This only covers lines that *look* like they're trying to be AUTH/PROXY;
/// anything that doesn't start with those keywords is [`Command::Public`],
/// never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthParseError {
    /// No `user:pass` field at all, or the wrong number of space-separated tokens.
    InvalidFormat,
    /// The `user:pass` field didn't split into exactly two colon-separated parts.
    InvalidAuthString,
}

impl AuthParseError {
    /// The exact line to write back to the client before closing, per spec.md §4.1.
    pub fn reason_line(&self) -> &'static str {
        match self {
            AuthParseError::InvalidFormat => "AUTH_FAILED invalid format\n",
            AuthParseError::InvalidAuthString => "AUTH_FAILED invalid auth string\n",
        }
    }
}

/// Read and classify the first line of a freshly accepted connection.
///
/// On success, returns the command together with the [`BufReader`] it was
/// read from — callers handling [`Command::Public`] must keep using that
/// reader (never `into_inner`) so any pipelined bytes already buffered past
/// the first line aren't dropped.
pub async fn read_command(
    mut reader: BufReader<TcpStream>,
) -> std::io::Result<(Command, BufReader<TcpStream>)> {
    let mut line = Vec::new();
    let n = reader.read_until(b'\n', &mut line).await?;
    if n == 0 {
        return Ok((Command::Public { first_line: line }, reader));
    }

    match parse_line(&line) {
        ParsedLine::Auth(Ok((username, password))) => {
            Ok((Command::Auth { username, password }, reader))
        }
        ParsedLine::Auth(Err(e)) => {
            let _ = reader.get_mut().write_all(e.reason_line().as_bytes()).await;
            Ok((Command::Rejected, reader))
        }
        ParsedLine::Proxy(Ok(username)) => Ok((Command::Proxy { username }, reader)),
        ParsedLine::Proxy(Err(())) => {
            // Mis-formatted PROXY closes the connection immediately, same
            // as mis-formatted AUTH (spec.md §4.1) — it must never fall
            // through to Command::Public and have its raw bytes replayed
            // onto a hidden service as if they were payload.
            Ok((Command::Rejected, reader))
        }
        ParsedLine::Other => Ok((Command::Public { first_line: line }, reader)),
    }
}

enum ParsedLine {
    Auth(Result<(String, String), AuthParseError>),
    Proxy(Result<String, ()>),
    Other,
}

fn parse_line(line: &[u8]) -> ParsedLine {
    let text = match std::str::from_utf8(line) {
        Ok(t) => t.trim_end_matches(['\n', '\r']),
        Err(_) => return ParsedLine::Other,
    };

    if let Some(rest) = text.strip_prefix("AUTH ") {
        return ParsedLine::Auth(parse_auth_body(rest.trim()));
    }
    if text == "AUTH" {
        return ParsedLine::Auth(Err(AuthParseError::InvalidFormat));
    }

    if let Some(rest) = text.strip_prefix("PROXY ") {
        let username = rest.trim();
        return if username.is_empty() || username.contains(char::is_whitespace) {
            ParsedLine::Proxy(Err(()))
        } else {
            ParsedLine::Proxy(Ok(username.to_string()))
        };
    }
    if text == "PROXY" {
        return ParsedLine::Proxy(Err(()));
    }

    ParsedLine::Other
}

fn parse_auth_body(body: &str) -> Result<(String, String), AuthParseError> {
    if body.is_empty() || body.contains(char::is_whitespace) {
        return Err(AuthParseError::InvalidFormat);
    }
    let mut parts = body.splitn(3, ':');
    let username = parts.next().unwrap_or("");
    let password = match parts.next() {
        Some(p) => p,
        None => return Err(AuthParseError::InvalidAuthString),
    };
    if parts.next().is_some() {
        // More than one `:` — extra colons are rejected (spec.md §8 boundary cases).
        return Err(AuthParseError::InvalidAuthString);
    }
    if username.is_empty() || password.is_empty() {
        return Err(AuthParseError::InvalidAuthString);
    }
    Ok((username.to_string(), password.to_string()))
}

/// Format an `AUTH` command line sent by the client.
pub fn format_auth(username: &str, password: &str) -> String {
    format!("AUTH {}:{}\n", username, password)
}

/// Format the success reply sent by the server.
pub fn format_auth_ok(pool_size: usize) -> String {
    format!("AUTH_OK pool_size={}\n", pool_size)
}

/// Format a failure reply sent by the server.
pub fn format_auth_failed(reason: &str) -> String {
    format!("AUTH_FAILED {}\n", reason)
}

/// Format a `PROXY` command line sent by the client.
pub fn format_proxy(username: &str) -> String {
    format!("PROXY {}\n", username)
}

/// Parse the `pool_size=<N>` field out of an `AUTH_OK` line. Falls back to
/// [`DEFAULT_CLIENT_POOL_SIZE`] on any parse failure, per spec.md §4.7 step 5.
pub fn parse_pool_size(line: &str) -> usize {
    line.trim_end()
        .split_whitespace()
        .find_map(|tok| tok.strip_prefix("pool_size="))
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(DEFAULT_CLIENT_POOL_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_auth_line() {
        match parse_line(b"AUTH admin:123456\n") {
            ParsedLine::Auth(Ok((u, p))) => {
                assert_eq!(u, "admin");
                assert_eq!(p, "123456");
            }
            _ => panic!("expected Auth"),
        }
    }

    #[test]
    fn test_parse_auth_missing_colon() {
        match parse_line(b"AUTH adminpass\n") {
            ParsedLine::Auth(Err(AuthParseError::InvalidAuthString)) => {}
            other => panic!("expected InvalidAuthString, got {other:?}", other = debug(&other)),
        }
    }

    #[test]
    fn test_parse_auth_extra_colon() {
        match parse_line(b"AUTH admin:pass:word\n") {
            ParsedLine::Auth(Err(AuthParseError::InvalidAuthString)) => {}
            _ => panic!("expected InvalidAuthString"),
        }
    }

    #[test]
    fn test_parse_auth_empty_body() {
        match parse_line(b"AUTH \n") {
            ParsedLine::Auth(Err(AuthParseError::InvalidFormat)) => {}
            _ => panic!("expected InvalidFormat"),
        }
    }

    #[test]
    fn test_parse_proxy_line() {
        match parse_line(b"PROXY admin\n") {
            ParsedLine::Proxy(Ok(u)) => assert_eq!(u, "admin"),
            _ => panic!("expected Proxy"),
        }
    }

    #[test]
    fn test_parse_proxy_bare_keyword_is_rejected() {
        match parse_line(b"PROXY\n") {
            ParsedLine::Proxy(Err(())) => {}
            _ => panic!("expected rejected Proxy"),
        }
    }

    #[test]
    fn test_parse_proxy_empty_username_is_rejected() {
        match parse_line(b"PROXY \n") {
            ParsedLine::Proxy(Err(())) => {}
            _ => panic!("expected rejected Proxy"),
        }
    }

    #[test]
    fn test_parse_proxy_extra_tokens_rejected() {
        match parse_line(b"PROXY admin extra\n") {
            ParsedLine::Proxy(Err(())) => {}
            _ => panic!("expected rejected Proxy"),
        }
    }

    #[tokio::test]
    async fn test_read_command_rejects_malformed_proxy() {
        use tokio::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, mut connect) = tokio::join!(listener.accept(), connect);
        let server_side = accept.unwrap().0;

        connect.as_mut().unwrap().write_all(b"PROXY a b\n").await.unwrap();

        let (command, _reader) = read_command(BufReader::new(server_side)).await.unwrap();
        assert_eq!(command, Command::Rejected);
    }

    #[test]
    fn test_parse_other_is_public() {
        match parse_line(b"GET / HTTP/1.1\r\n") {
            ParsedLine::Other => {}
            _ => panic!("expected Other"),
        }
    }

    #[test]
    fn test_parse_pool_size_present() {
        assert_eq!(parse_pool_size("AUTH_OK pool_size=7\n"), 7);
    }

    #[test]
    fn test_parse_pool_size_missing_falls_back() {
        assert_eq!(parse_pool_size("AUTH_OK\n"), DEFAULT_CLIENT_POOL_SIZE);
    }

    #[test]
    fn test_parse_pool_size_unparseable_falls_back() {
        assert_eq!(parse_pool_size("AUTH_OK pool_size=abc\n"), DEFAULT_CLIENT_POOL_SIZE);
    }

    #[test]
    fn test_format_roundtrip() {
        let line = format_auth("admin", "123456");
        assert_eq!(line, "AUTH admin:123456\n");
        let ok = format_auth_ok(20);
        assert_eq!(ok, "AUTH_OK pool_size=20\n");
        let failed = format_auth_failed("invalid credentials");
        assert_eq!(failed, "AUTH_FAILED invalid credentials\n");
        let proxy = format_proxy("admin");
        assert_eq!(proxy, "PROXY admin\n");
    }

    fn debug(p: &ParsedLine) -> &'static str {
        match p {
            ParsedLine::Auth(_) => "Auth",
            ParsedLine::Proxy(_) => "Proxy",
            ParsedLine::Other => "Other",
        }
    }
}
