//! WebSocket opening handshake (server side)
//!
//! Waits for the end of the HTTP header block in a connection's read buffer,
//! pulls out `Sec-WebSocket-Key`, and answers with a `101 Switching Protocols`
//! response carrying the derived `Sec-WebSocket-Accept` value.

use base64::Engine;
use bytes::{BufMut, Bytes, BytesMut};
use sha1::{Digest, Sha1};

use crate::WS_GUID;
use crate::error::Error;

/// End-of-headers marker
const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Maximum number of request headers parsed
const MAX_HEADERS: usize = 32;

/// Result of one handshake attempt
#[derive(Debug)]
pub enum HandshakeOutcome {
    /// Header block not complete yet; the buffer was left untouched
    Pending,
    /// Upgrade accepted; the buffer was cleared and `response` must be written
    Completed {
        /// The computed `Sec-WebSocket-Accept` value
        accept_key: String,
        /// Full HTTP response to send back
        response: Bytes,
    },
    /// The request cannot be upgraded; the connection should be closed
    Failed(Error),
}

/// Try to complete the handshake from the bytes buffered so far
///
/// Anything received after the header block is discarded together with the
/// request itself: clients send no body with an upgrade request.
pub fn try_handshake(buf: &mut BytesMut, max_handshake_size: usize) -> HandshakeOutcome {
    let Some(header_end) = find_header_end(buf) else {
        if buf.len() > max_handshake_size {
            return HandshakeOutcome::Failed(Error::InvalidHttp("request too large"));
        }
        return HandshakeOutcome::Pending;
    };

    let key = match extract_key(&buf[..header_end]) {
        Ok(key) => key,
        Err(e) => return HandshakeOutcome::Failed(e),
    };

    buf.clear();

    let accept_key = generate_accept_key(&key);
    let response = build_response(&accept_key);

    HandshakeOutcome::Completed {
        accept_key,
        response,
    }
}

/// Position just past the first `\r\n\r\n`, if present
#[inline]
pub fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)
        .map(|pos| pos + HEADER_TERMINATOR.len())
}

/// Parse the header block and return the non-empty `Sec-WebSocket-Key`
///
/// `head` already ends at the first terminator, so a request httparse still
/// reports as partial (e.g. leading blank lines) can never complete.
fn extract_key(head: &[u8]) -> Result<String, Error> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    match req.parse(head) {
        Ok(httparse::Status::Complete(_)) => {}
        Ok(httparse::Status::Partial) => {
            return Err(Error::InvalidHttp("incomplete request"));
        }
        Err(_) => return Err(Error::InvalidHttp("failed to parse HTTP request")),
    }

    let value = req
        .headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case("sec-websocket-key"))
        .map(|h| h.value)
        .ok_or(Error::HandshakeFailed("missing Sec-WebSocket-Key"))?;

    let key = std::str::from_utf8(value)
        .map_err(|_| Error::InvalidHttp("invalid header value"))?
        .trim();

    if key.is_empty() {
        return Err(Error::HandshakeFailed("empty Sec-WebSocket-Key"));
    }

    Ok(key.to_owned())
}

/// Generate the Sec-WebSocket-Accept key
///
/// This computes: Base64(SHA-1(key + GUID))
#[inline]
pub fn generate_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    let hash = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(hash)
}

/// Build the 101 upgrade response
pub fn build_response(accept_key: &str) -> Bytes {
    let mut buf = BytesMut::with_capacity(128);

    buf.put_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
    buf.put_slice(b"Upgrade: websocket\r\n");
    buf.put_slice(b"Connection: Upgrade\r\n");
    buf.put_slice(b"Sec-WebSocket-Accept: ");
    buf.put_slice(accept_key.as_bytes());
    buf.put_slice(b"\r\n\r\n");

    buf.freeze()
}
