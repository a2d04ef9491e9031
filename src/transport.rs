//! Transport seam between the protocol engine and the socket layer
//!
//! The engine never touches sockets. It reads from a per-connection buffer
//! the transport fills, and hands outgoing bytes back through [`Transport`].
//!
//! # Example
//!
//! ```
//! use ws_worker::connection::ConnectionId;
//! use ws_worker::transport::{MemoryTransport, Transport};
//!
//! let id = ConnectionId::new(1);
//! let mut transport = MemoryTransport::new();
//! transport.open(id);
//! transport.deliver(id, b"GET / HTTP/1.1\r\n");
//!
//! assert_eq!(transport.read_buffer(id).map(|b| b.len()), Some(16));
//! ```

use std::collections::{HashMap, HashSet};

use bytes::{BufMut, Bytes, BytesMut};

use crate::connection::ConnectionId;
use crate::error::{Error, Result};

/// Byte-level transport consumed by [`crate::Worker`]
pub trait Transport {
    /// Native handle type the transport uses for connections
    type Handle;

    /// Resolve the connection id behind a native handle
    fn connection_id(&self, handle: &Self::Handle) -> ConnectionId;

    /// Bytes received on `id` and not yet consumed
    ///
    /// The engine truncates this buffer as it consumes the handshake and
    /// complete frames. `None` means the transport no longer knows `id`.
    fn read_buffer(&mut self, id: ConnectionId) -> Option<&mut BytesMut>;

    /// Write raw bytes to a connection
    fn write(&mut self, id: ConnectionId, data: &[u8]) -> Result<()>;

    /// Write one message followed by `delimiter`
    ///
    /// Used for the master link, which carries delimiter-separated messages
    /// rather than WebSocket frames.
    fn write_delimited(&mut self, id: ConnectionId, data: &[u8], delimiter: &[u8]) -> Result<()> {
        let mut buf = BytesMut::with_capacity(data.len() + delimiter.len());
        buf.put_slice(data);
        buf.put_slice(delimiter);
        self.write(id, &buf)
    }

    /// Close the underlying connection
    ///
    /// Must be idempotent: the engine may close a connection the peer has
    /// already dropped.
    fn close(&mut self, id: ConnectionId);
}

/// In-memory transport
///
/// Keeps read buffers and captured output per connection. Handy for
/// embedding the engine behind a custom event loop and for tests.
#[derive(Debug, Default)]
pub struct MemoryTransport {
    read: HashMap<ConnectionId, BytesMut>,
    written: HashMap<ConnectionId, BytesMut>,
    closed: HashSet<ConnectionId>,
}

impl MemoryTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with an empty read buffer
    pub fn open(&mut self, id: ConnectionId) {
        self.closed.remove(&id);
        self.read.entry(id).or_default();
    }

    /// Append received bytes to a connection's read buffer
    pub fn deliver(&mut self, id: ConnectionId, data: &[u8]) {
        self.read.entry(id).or_default().extend_from_slice(data);
    }

    /// Everything written to `id` so far
    pub fn written(&self, id: ConnectionId) -> &[u8] {
        self.written.get(&id).map(|b| &b[..]).unwrap_or(&[])
    }

    /// Take and clear everything written to `id`
    pub fn take_written(&mut self, id: ConnectionId) -> Bytes {
        self.written
            .get_mut(&id)
            .map(|b| b.split().freeze())
            .unwrap_or_default()
    }

    /// Check if `close` was called for `id`
    pub fn is_closed(&self, id: ConnectionId) -> bool {
        self.closed.contains(&id)
    }
}

impl Transport for MemoryTransport {
    type Handle = ConnectionId;

    fn connection_id(&self, handle: &ConnectionId) -> ConnectionId {
        *handle
    }

    fn read_buffer(&mut self, id: ConnectionId) -> Option<&mut BytesMut> {
        self.read.get_mut(&id)
    }

    fn write(&mut self, id: ConnectionId, data: &[u8]) -> Result<()> {
        if self.closed.contains(&id) {
            return Err(Error::ConnectionClosed);
        }
        self.written.entry(id).or_default().extend_from_slice(data);
        Ok(())
    }

    fn close(&mut self, id: ConnectionId) {
        self.read.remove(&id);
        self.closed.insert(id);
    }
}
