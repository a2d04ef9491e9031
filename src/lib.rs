//! # ws-worker: WebSocket protocol engine for worker processes
//!
//! The engine sits between a byte-oriented transport and application code
//! in a master/worker server. It upgrades raw client connections with the
//! RFC 6455 opening handshake, decodes and encodes frames, and relays
//! delimiter-separated control messages over the link to the master process.
//!
//! ## Layers
//!
//! - [`frame`]: stateless frame encode/decode on byte buffers
//! - [`handshake`]: HTTP upgrade parsing and `Sec-WebSocket-Accept`
//! - [`connection`]: explicit per-connection state table
//! - [`worker`]: event entry points and the [`WorkerHandler`] callbacks
//! - [`transport`]: the byte-level seam the engine consumes
//! - `runtime` (feature `tokio-runtime`): a TCP driver built on tokio
//!
//! Single-threaded and sans-io: every event runs to completion and
//! "need more bytes" is a return value.
//!
//! ## Example
//!
//! ```
//! use ws_worker::connection::ConnectionId;
//! use ws_worker::frame::{OpCode, encode_frame};
//! use ws_worker::transport::MemoryTransport;
//! use ws_worker::{Config, Context, Frame, Worker, WorkerHandler};
//! use ws_worker::transport::Transport;
//! use bytes::{Bytes, BytesMut};
//!
//! #[derive(Default)]
//! struct Collect(Vec<String>);
//!
//! impl<T: Transport> WorkerHandler<T> for Collect {
//!     fn on_open(&mut self, _: &mut Context<'_, T>, _: ConnectionId) {}
//!     fn on_message(&mut self, _: &mut Context<'_, T>, _: ConnectionId, frame: Frame) {
//!         self.0.push(frame.as_text().unwrap().to_owned());
//!     }
//!     fn on_close(&mut self, _: &mut Context<'_, T>, _: ConnectionId) {}
//!     fn on_master_message(&mut self, _: &mut Context<'_, T>, _: Bytes) {}
//! }
//!
//! let master = ConnectionId::new(0);
//! let client = ConnectionId::new(1);
//! let mut worker = Worker::new(MemoryTransport::new(), &master, Collect::default(), Config::default());
//!
//! worker.transport_mut().open(client);
//! worker.on_open(client);
//! worker.transport_mut().deliver(
//!     client,
//!     b"GET / HTTP/1.1\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n",
//! );
//! worker.on_data(client);
//!
//! let mut frame = BytesMut::new();
//! encode_frame(&mut frame, OpCode::Text, b"hello", Some([1, 2, 3, 4]));
//! worker.transport_mut().deliver(client, &frame);
//! worker.on_data(client);
//!
//! assert_eq!(worker.handler().0, vec!["hello".to_string()]);
//! ```

pub mod connection;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod mask;
pub mod transport;
pub mod utf8;
pub mod worker;

#[cfg(feature = "tokio-runtime")]
pub mod runtime;

use bytes::Bytes;

pub use connection::{ConnectionId, ConnectionState};
pub use error::{Error, Result};
pub use frame::{Frame, OpCode};
pub use transport::Transport;
pub use worker::{Context, Worker, WorkerHandler};

/// Default receive buffer size (64KB)
pub const RECV_BUFFER_SIZE: usize = 64 * 1024;

/// Maximum WebSocket frame header size (2 + 8 + 4 = 14 bytes)
pub const MAX_FRAME_HEADER_SIZE: usize = 14;

/// Largest payload carried by the 7-bit length field
pub const SMALL_MESSAGE_THRESHOLD: usize = 125;

/// Largest payload carried by the 16-bit length extension
pub const MEDIUM_MESSAGE_THRESHOLD: usize = 65535;

/// Largest outbound payload: the 64-bit length is written with a zero high word
pub const MAX_PAYLOAD_LENGTH: usize = u32::MAX as usize;

/// WebSocket GUID for handshake
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Default delimiter terminating messages on the master link
pub const DEFAULT_MASTER_DELIMITER: &[u8] = b"\n";

/// Configuration for a worker
///
/// # Example
///
/// ```
/// use ws_worker::Config;
///
/// let config = Config::builder()
///     .max_frame_size(1024 * 1024)
///     .master_delimiter("\0")
///     .close_on_invalid_utf8(true)
///     .build();
///
/// assert_eq!(config.master_delimiter.as_ref(), b"\0");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Largest handshake request accepted before the header block ends (default: 8KB)
    pub max_handshake_size: usize,
    /// Largest declared frame payload; bigger frames close the connection (default: 16MB)
    pub max_frame_size: usize,
    /// Terminator appended to every message sent to the master (default: `\n`)
    pub master_delimiter: Bytes,
    /// Close connections that send a non-UTF-8 payload instead of leaving
    /// the frame buffered (default: false)
    pub close_on_invalid_utf8: bool,
    /// Per-read buffer size used by the tokio driver (default: 64KB)
    pub read_buffer_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_handshake_size: 8 * 1024,
            max_frame_size: 16 * 1024 * 1024,
            master_delimiter: Bytes::from_static(DEFAULT_MASTER_DELIMITER),
            close_on_invalid_utf8: false,
            read_buffer_size: RECV_BUFFER_SIZE,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::new()
    }
}

/// Builder for worker configuration
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder with default values
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    /// Set the handshake request size limit
    pub fn max_handshake_size(mut self, size: usize) -> Self {
        self.config.max_handshake_size = size;
        self
    }

    /// Set the maximum frame payload size
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the master link message delimiter
    pub fn master_delimiter(mut self, delimiter: impl Into<Bytes>) -> Self {
        self.config.master_delimiter = delimiter.into();
        self
    }

    /// Close connections on non-UTF-8 payloads
    pub fn close_on_invalid_utf8(mut self, enabled: bool) -> Self {
        self.config.close_on_invalid_utf8 = enabled;
        self
    }

    /// Set the driver's per-read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::Config;
    pub use crate::connection::{ConnectionId, ConnectionState};
    pub use crate::error::{Error, Result};
    pub use crate::frame::{Frame, OpCode};
    pub use crate::transport::Transport;
    pub use crate::worker::{Context, Worker, WorkerHandler};
}
