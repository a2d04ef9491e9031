//! Error types for the worker protocol engine

use std::fmt;
use std::io;

use crate::connection::ConnectionId;

/// Result type alias for worker operations
pub type Result<T> = std::result::Result<T, Error>;

/// Worker error types
#[derive(Debug)]
pub enum Error {
    /// I/O error from the underlying transport
    Io(io::Error),
    /// Invalid UTF-8 in a frame payload
    InvalidUtf8,
    /// Malformed HTTP upgrade request
    InvalidHttp(&'static str),
    /// Handshake could not be completed
    HandshakeFailed(&'static str),
    /// Declared frame length exceeds the configured maximum
    FrameTooLarge,
    /// Outbound payload does not fit the 32-bit frame length cap
    MessageTooLarge,
    /// Connection closed (or write after close)
    ConnectionClosed,
    /// The transport has no connection with this id
    UnknownConnection(ConnectionId),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::InvalidUtf8 => write!(f, "Invalid UTF-8 in frame payload"),
            Error::InvalidHttp(msg) => write!(f, "Invalid HTTP: {}", msg),
            Error::HandshakeFailed(msg) => write!(f, "Handshake failed: {}", msg),
            Error::FrameTooLarge => write!(f, "Frame too large"),
            Error::MessageTooLarge => write!(f, "Message too large"),
            Error::ConnectionClosed => write!(f, "Connection closed"),
            Error::UnknownConnection(id) => write!(f, "Unknown connection: {}", id),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::UnexpectedEof => Error::ConnectionClosed,
            _ => Error::Io(e),
        }
    }
}
