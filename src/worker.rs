//! Event dispatch for a WebSocket worker
//!
//! [`Worker`] owns the connection table and the master link. The transport
//! layer feeds it four kinds of events (connection opened, bytes arrived,
//! connection closed, master data) and it answers by driving the handshake,
//! decoding frames and invoking a [`WorkerHandler`].
//!
//! Everything runs synchronously inside the event call. "Need more bytes" is
//! a return value, never a wait.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use ws_worker::connection::ConnectionId;
//! use ws_worker::frame::Frame;
//! use ws_worker::transport::{MemoryTransport, Transport};
//! use ws_worker::{Config, Context, Worker, WorkerHandler};
//!
//! struct Echo;
//!
//! impl<T: Transport> WorkerHandler<T> for Echo {
//!     fn on_open(&mut self, _ctx: &mut Context<'_, T>, _id: ConnectionId) {}
//!
//!     fn on_message(&mut self, ctx: &mut Context<'_, T>, id: ConnectionId, frame: Frame) {
//!         let _ = ctx.send_to_client(id, &frame.payload);
//!     }
//!
//!     fn on_close(&mut self, _ctx: &mut Context<'_, T>, _id: ConnectionId) {}
//!
//!     fn on_master_message(&mut self, ctx: &mut Context<'_, T>, data: Bytes) {
//!         let _ = ctx.broadcast(&data);
//!     }
//! }
//!
//! let master = ConnectionId::new(0);
//! let mut worker = Worker::new(MemoryTransport::new(), &master, Echo, Config::default());
//! worker.on_open(ConnectionId::new(1));
//! ```

use std::collections::VecDeque;

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace, warn};

use crate::Config;
use crate::connection::{ConnectionId, ConnectionState, ConnectionTable};
use crate::error::{Error, Result};
use crate::frame::{Frame, OpCode, encode_frame, peek_frame};
use crate::handshake::{HandshakeOutcome, try_handshake};
use crate::transport::Transport;
use crate::utf8::validate_utf8;

/// Application callbacks of a worker
///
/// Guarantees:
/// - `on_open` fires exactly once per connection, after a successful handshake
/// - `on_message` fires once per decoded frame whose payload is valid UTF-8
/// - `on_close` fires exactly once, only for connections that were open
/// - `on_master_message` fires once per delivery on the master link
pub trait WorkerHandler<T: Transport> {
    /// A client completed the WebSocket handshake
    fn on_open(&mut self, ctx: &mut Context<'_, T>, id: ConnectionId);

    /// A frame arrived on an open connection
    fn on_message(&mut self, ctx: &mut Context<'_, T>, id: ConnectionId, frame: Frame);

    /// An open connection was closed
    fn on_close(&mut self, ctx: &mut Context<'_, T>, id: ConnectionId);

    /// Data arrived on the master link
    fn on_master_message(&mut self, ctx: &mut Context<'_, T>, data: Bytes);
}

/// Outbound primitives available to callbacks
pub struct Context<'a, T: Transport> {
    transport: &'a mut T,
    connections: &'a ConnectionTable,
    pending_close: &'a mut VecDeque<ConnectionId>,
    master: ConnectionId,
    config: &'a Config,
}

impl<T: Transport> Context<'_, T> {
    /// Send a text frame to a client
    ///
    /// Connections still waiting for their handshake silently drop the
    /// message. Closed connections report [`Error::ConnectionClosed`].
    pub fn send_to_client(&mut self, id: ConnectionId, payload: impl AsRef<[u8]>) -> Result<()> {
        self.send_frame(id, OpCode::Text, payload.as_ref())
    }

    /// Send a frame with an explicit opcode to a client
    pub fn send_frame(&mut self, id: ConnectionId, opcode: OpCode, payload: &[u8]) -> Result<()> {
        match self.connections.state(id) {
            ConnectionState::Open => {}
            ConnectionState::AwaitingHandshake => {
                trace!(
                    "dropping {} frame for {}: handshake pending",
                    opcode.name(),
                    id
                );
                return Ok(());
            }
            ConnectionState::Closed => return Err(Error::ConnectionClosed),
        }

        if payload.len() > crate::MAX_PAYLOAD_LENGTH {
            return Err(Error::MessageTooLarge);
        }

        let mut buf = BytesMut::with_capacity(crate::MAX_FRAME_HEADER_SIZE + payload.len());
        encode_frame(&mut buf, opcode, payload, None);
        self.transport.write(id, &buf)
    }

    /// Send a text frame to every open connection
    ///
    /// Returns how many connections the frame was written to. Per-connection
    /// write failures are logged and skipped.
    pub fn broadcast(&mut self, payload: impl AsRef<[u8]>) -> Result<usize> {
        let payload = payload.as_ref();
        if payload.len() > crate::MAX_PAYLOAD_LENGTH {
            return Err(Error::MessageTooLarge);
        }

        let mut buf = BytesMut::new();
        encode_frame(&mut buf, OpCode::Text, payload, None);

        let mut sent = 0;
        for id in self.connections.open_ids() {
            match self.transport.write(id, &buf) {
                Ok(()) => sent += 1,
                Err(e) => warn!("broadcast to {} failed: {}", id, e),
            }
        }
        Ok(sent)
    }

    /// Send a message to the master process
    pub fn send_to_master(&mut self, payload: impl AsRef<[u8]>) -> Result<()> {
        self.transport.write_delimited(
            self.master,
            payload.as_ref(),
            &self.config.master_delimiter,
        )
    }

    /// Close a connection once the current callback returns
    pub fn close(&mut self, id: ConnectionId) {
        if !self.pending_close.contains(&id) {
            self.pending_close.push_back(id);
        }
    }

    /// Current state of a connection
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections.state(id)
    }

    /// Id of the master link
    pub fn master_id(&self) -> ConnectionId {
        self.master
    }

    /// Ids of all open connections
    pub fn open_connections(&self) -> Vec<ConnectionId> {
        self.connections.open_ids().collect()
    }
}

/// WebSocket worker: connection state machine plus callback dispatch
pub struct Worker<T: Transport, H: WorkerHandler<T>> {
    transport: T,
    handler: H,
    connections: ConnectionTable,
    master: ConnectionId,
    config: Config,
    pending_close: VecDeque<ConnectionId>,
}

impl<T: Transport, H: WorkerHandler<T>> Worker<T, H> {
    /// Create a worker attached to its master link
    pub fn new(transport: T, master: &T::Handle, handler: H, config: Config) -> Self {
        let master = transport.connection_id(master);
        debug!("worker started, master link {}", master);

        Self {
            transport,
            handler,
            connections: ConnectionTable::new(),
            master,
            config,
            pending_close: VecDeque::new(),
        }
    }

    /// Transport reported a new client connection
    pub fn on_open(&mut self, id: ConnectionId) {
        if id == self.master {
            warn!("ignoring open event for master link {}", id);
            return;
        }

        let previous = self.connections.insert_pending(id);
        if previous != ConnectionState::Closed {
            debug!("connection {} reopened while {:?}", id, previous);
        }
        trace!("connection {} awaiting handshake", id);
    }

    /// Transport appended bytes to the read buffer of `id`
    pub fn on_data(&mut self, id: ConnectionId) {
        if id == self.master {
            let data = match self.transport.read_buffer(id) {
                Some(buf) if !buf.is_empty() => buf.split().freeze(),
                _ => return,
            };
            self.on_master_data(data);
            return;
        }

        match self.connections.state(id) {
            ConnectionState::AwaitingHandshake => self.advance_handshake(id),
            ConnectionState::Open => self.drain_frames(id),
            ConnectionState::Closed => trace!("ignoring data for untracked connection {}", id),
        }
    }

    /// Transport reported that `id` went away
    ///
    /// The socket is already gone, so the transport is not asked to close it.
    pub fn on_close(&mut self, id: ConnectionId) {
        self.forget(id);
    }

    /// Data arrived on the master link
    pub fn on_master_data(&mut self, data: Bytes) {
        trace!("master link delivered {} bytes", data.len());
        self.dispatch(|handler, ctx| handler.on_master_message(ctx, data));
    }

    /// Send a text frame to a client (dropped while the handshake is pending)
    pub fn send_to_client(&mut self, id: ConnectionId, payload: impl AsRef<[u8]>) -> Result<()> {
        self.context().send_to_client(id, payload)
    }

    /// Send a frame with an explicit opcode to a client
    pub fn send_frame(&mut self, id: ConnectionId, opcode: OpCode, payload: &[u8]) -> Result<()> {
        self.context().send_frame(id, opcode, payload)
    }

    /// Send a text frame to every open connection
    pub fn broadcast(&mut self, payload: impl AsRef<[u8]>) -> Result<usize> {
        self.context().broadcast(payload)
    }

    /// Send a message to the master process
    pub fn send_to_master(&mut self, payload: impl AsRef<[u8]>) -> Result<()> {
        self.context().send_to_master(payload)
    }

    /// Close a connection and fire `on_close` if it was open
    pub fn close(&mut self, id: ConnectionId) {
        self.transport.close(id);
        self.forget(id);
    }

    /// Current state of a connection
    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections.state(id)
    }

    /// Number of tracked client connections (pending and open)
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Id of the master link
    pub fn master_id(&self) -> ConnectionId {
        self.master
    }

    /// Worker configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The application handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// The application handler, mutably
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// The transport, mutably (to deliver bytes before `on_data`)
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    fn advance_handshake(&mut self, id: ConnectionId) {
        let Some(buf) = self.transport.read_buffer(id) else {
            trace!("no read buffer for pending connection {}", id);
            return;
        };

        match try_handshake(buf, self.config.max_handshake_size) {
            HandshakeOutcome::Pending => {
                trace!("handshake for {} incomplete, waiting", id);
            }
            HandshakeOutcome::Completed { response, .. } => {
                if let Err(e) = self.transport.write(id, &response) {
                    warn!("failed to send handshake response to {}: {}", id, e);
                    self.close(id);
                    return;
                }
                self.connections.mark_open(id);
                debug!("connection {} upgraded to WebSocket", id);
                self.dispatch(|handler, ctx| handler.on_open(ctx, id));
            }
            HandshakeOutcome::Failed(e) => {
                debug!("handshake for {} failed: {}", id, e);
                self.close(id);
            }
        }
    }

    fn drain_frames(&mut self, id: ConnectionId) {
        while self.connections.is_open(id) {
            let Some(buf) = self.transport.read_buffer(id) else {
                break;
            };

            let (frame, frame_len) = match peek_frame(buf, self.config.max_frame_size) {
                Ok(Some(decoded)) => decoded,
                Ok(None) => break,
                Err(e) => {
                    warn!("closing {}: {}", id, e);
                    self.close(id);
                    break;
                }
            };

            if !validate_utf8(&frame.payload) {
                if self.config.close_on_invalid_utf8 {
                    debug!("closing {}: non-UTF-8 {} payload", id, frame.opcode().name());
                    self.close(id);
                } else {
                    debug!(
                        "non-UTF-8 {} payload on {}, leaving {} bytes buffered",
                        frame.opcode().name(),
                        id,
                        buf.len()
                    );
                }
                break;
            }

            buf.advance(frame_len);
            trace!(
                "decoded {} frame ({} bytes) on {}",
                frame.opcode().name(),
                frame.payload.len(),
                id
            );
            self.dispatch(|handler, ctx| handler.on_message(ctx, id, frame));
        }
    }

    fn forget(&mut self, id: ConnectionId) {
        match self.connections.remove(id) {
            ConnectionState::Open => {
                debug!("connection {} closed", id);
                self.dispatch(|handler, ctx| handler.on_close(ctx, id));
            }
            ConnectionState::AwaitingHandshake => {
                debug!("connection {} closed before handshake", id);
            }
            ConnectionState::Closed => {}
        }
    }

    fn context(&mut self) -> Context<'_, T> {
        Context {
            transport: &mut self.transport,
            connections: &self.connections,
            pending_close: &mut self.pending_close,
            master: self.master,
            config: &self.config,
        }
    }

    /// Run a callback, then apply any closes it requested
    fn dispatch<F>(&mut self, f: F)
    where
        F: FnOnce(&mut H, &mut Context<'_, T>),
    {
        let Worker {
            transport,
            handler,
            connections,
            master,
            config,
            pending_close,
        } = &mut *self;

        let mut ctx = Context {
            transport,
            connections,
            pending_close,
            master: *master,
            config,
        };
        f(handler, &mut ctx);

        while let Some(id) = self.pending_close.pop_front() {
            self.close(id);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::BufMut;

    use super::*;
    use crate::transport::MemoryTransport;

    const MASTER: ConnectionId = ConnectionId::new(0);
    const CLIENT: ConnectionId = ConnectionId::new(1);
    const MASK: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

    const REQUEST: &[u8] = b"GET /ws HTTP/1.1\r\n\
        Host: localhost\r\n\
        Upgrade: websocket\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\
        \r\n";

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Event {
        Open(ConnectionId),
        Message(ConnectionId, OpCode, Vec<u8>),
        Close(ConnectionId),
        Master(Vec<u8>),
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<Event>,
        echo: bool,
        close_on: Option<&'static [u8]>,
    }

    impl<T: Transport> WorkerHandler<T> for Recorder {
        fn on_open(&mut self, _ctx: &mut Context<'_, T>, id: ConnectionId) {
            self.events.push(Event::Open(id));
        }

        fn on_message(&mut self, ctx: &mut Context<'_, T>, id: ConnectionId, frame: Frame) {
            if self.echo {
                ctx.send_to_client(id, &frame.payload).unwrap();
            }
            if self.close_on == Some(&frame.payload[..]) {
                ctx.close(id);
            }
            self.events
                .push(Event::Message(id, frame.opcode(), frame.payload.to_vec()));
        }

        fn on_close(&mut self, _ctx: &mut Context<'_, T>, id: ConnectionId) {
            self.events.push(Event::Close(id));
        }

        fn on_master_message(&mut self, _ctx: &mut Context<'_, T>, data: Bytes) {
            self.events.push(Event::Master(data.to_vec()));
        }
    }

    type TestWorker = Worker<MemoryTransport, Recorder>;

    fn worker_with(handler: Recorder, config: Config) -> TestWorker {
        Worker::new(MemoryTransport::new(), &MASTER, handler, config)
    }

    fn worker() -> TestWorker {
        worker_with(Recorder::default(), Config::default())
    }

    fn deliver(worker: &mut TestWorker, id: ConnectionId, data: &[u8]) {
        worker.transport_mut().deliver(id, data);
        worker.on_data(id);
    }

    fn client_frame(opcode: OpCode, payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, opcode, payload, Some(MASK));
        buf
    }

    fn open_client(worker: &mut TestWorker, id: ConnectionId) {
        worker.transport_mut().open(id);
        worker.on_open(id);
        deliver(worker, id, REQUEST);
        worker.transport_mut().take_written(id);
    }

    fn message(id: ConnectionId, payload: &[u8]) -> Event {
        Event::Message(id, OpCode::Text, payload.to_vec())
    }

    #[test]
    fn test_handshake_opens_connection() {
        let mut worker = worker();
        worker.transport_mut().open(CLIENT);
        worker.on_open(CLIENT);
        assert_eq!(worker.state(CLIENT), ConnectionState::AwaitingHandshake);

        deliver(&mut worker, CLIENT, REQUEST);

        assert_eq!(worker.state(CLIENT), ConnectionState::Open);
        assert_eq!(worker.handler().events, vec![Event::Open(CLIENT)]);

        let response = worker.transport().written(CLIENT);
        let text = std::str::from_utf8(response).unwrap();
        assert!(text.starts_with("HTTP/1.1 101"));
        assert!(text.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(worker.transport_mut().read_buffer(CLIENT).unwrap().is_empty());
    }

    #[test]
    fn test_handshake_split_across_deliveries() {
        let mut worker = worker();
        worker.transport_mut().open(CLIENT);
        worker.on_open(CLIENT);

        deliver(&mut worker, CLIENT, &REQUEST[..20]);
        assert_eq!(worker.state(CLIENT), ConnectionState::AwaitingHandshake);
        assert!(worker.handler().events.is_empty());
        assert!(worker.transport().written(CLIENT).is_empty());

        deliver(&mut worker, CLIENT, &REQUEST[20..]);
        assert_eq!(worker.state(CLIENT), ConnectionState::Open);
        assert_eq!(worker.handler().events, vec![Event::Open(CLIENT)]);
    }

    #[test]
    fn test_handshake_missing_key_closes() {
        let mut worker = worker();
        worker.transport_mut().open(CLIENT);
        worker.on_open(CLIENT);

        deliver(
            &mut worker,
            CLIENT,
            b"GET / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n",
        );

        assert_eq!(worker.state(CLIENT), ConnectionState::Closed);
        assert!(worker.transport().is_closed(CLIENT));
        assert!(worker.transport().written(CLIENT).is_empty());

        // The transport's own close notification must not surface either
        worker.on_close(CLIENT);
        assert!(worker.handler().events.is_empty());
    }

    #[test]
    fn test_handshake_after_blank_lines_closes() {
        let mut worker = worker();
        worker.transport_mut().open(CLIENT);
        worker.on_open(CLIENT);

        let mut data = b"\r\n\r\n".to_vec();
        data.extend_from_slice(REQUEST);
        deliver(&mut worker, CLIENT, &data);

        assert_eq!(worker.state(CLIENT), ConnectionState::Closed);
        assert!(worker.transport().is_closed(CLIENT));
        assert!(worker.transport().written(CLIENT).is_empty());
        assert!(worker.handler().events.is_empty());
    }

    #[test]
    fn test_two_frames_one_delivery() {
        let mut worker = worker();
        open_client(&mut worker, CLIENT);

        let mut data = client_frame(OpCode::Text, b"one");
        data.extend_from_slice(&client_frame(OpCode::Text, b"two"));
        deliver(&mut worker, CLIENT, &data);

        assert_eq!(
            worker.handler().events,
            vec![
                Event::Open(CLIENT),
                message(CLIENT, b"one"),
                message(CLIENT, b"two"),
            ]
        );
    }

    #[test]
    fn test_frame_split_across_deliveries() {
        let mut worker = worker();
        open_client(&mut worker, CLIENT);

        let data = client_frame(OpCode::Text, &[b'x'; 200]);
        deliver(&mut worker, CLIENT, &data[..50]);
        assert_eq!(worker.handler().events.len(), 1);

        deliver(&mut worker, CLIENT, &data[50..]);
        assert_eq!(worker.handler().events.len(), 2);
        assert_eq!(worker.handler().events[1], message(CLIENT, &[b'x'; 200]));
    }

    #[test]
    fn test_invalid_utf8_halts_decoding() {
        let mut worker = worker();
        open_client(&mut worker, CLIENT);

        let bad = client_frame(OpCode::Text, &[0xFF, 0xFE]);
        let mut data = client_frame(OpCode::Text, b"good");
        data.extend_from_slice(&bad);
        data.extend_from_slice(&client_frame(OpCode::Text, b"after"));
        deliver(&mut worker, CLIENT, &data);

        assert_eq!(
            worker.handler().events,
            vec![Event::Open(CLIENT), message(CLIENT, b"good")]
        );
        assert_eq!(worker.state(CLIENT), ConnectionState::Open);

        // The bad frame stays at the front of the buffer
        let pending = worker.transport_mut().read_buffer(CLIENT).unwrap().clone();
        assert!(pending.starts_with(&bad));

        // Later deliveries do not re-deliver the first frame
        deliver(&mut worker, CLIENT, &client_frame(OpCode::Text, b"more"));
        assert_eq!(worker.handler().events.len(), 2);
    }

    #[test]
    fn test_invalid_utf8_strict_close() {
        let config = Config::builder().close_on_invalid_utf8(true).build();
        let mut worker = worker_with(Recorder::default(), config);
        open_client(&mut worker, CLIENT);

        deliver(&mut worker, CLIENT, &client_frame(OpCode::Text, &[0xC3]));

        assert_eq!(worker.state(CLIENT), ConnectionState::Closed);
        assert!(worker.transport().is_closed(CLIENT));
        assert_eq!(
            worker.handler().events,
            vec![Event::Open(CLIENT), Event::Close(CLIENT)]
        );
    }

    #[test]
    fn test_control_and_unknown_frames_delivered() {
        let mut worker = worker();
        open_client(&mut worker, CLIENT);

        let mut data = client_frame(OpCode::Ping, b"p");
        data.extend_from_slice(&client_frame(OpCode::Unknown(0x3), b"?"));
        deliver(&mut worker, CLIENT, &data);

        assert_eq!(
            worker.handler().events[1..],
            [
                Event::Message(CLIENT, OpCode::Ping, b"p".to_vec()),
                Event::Message(CLIENT, OpCode::Unknown(0x3), b"?".to_vec()),
            ]
        );
        // No automatic pong
        assert!(worker.transport().written(CLIENT).is_empty());
    }

    #[test]
    fn test_oversized_frame_closes() {
        let config = Config::builder().max_frame_size(16).build();
        let mut worker = worker_with(Recorder::default(), config);
        open_client(&mut worker, CLIENT);

        deliver(&mut worker, CLIENT, &client_frame(OpCode::Text, &[b'a'; 17]));

        assert_eq!(worker.state(CLIENT), ConnectionState::Closed);
        assert_eq!(
            worker.handler().events,
            vec![Event::Open(CLIENT), Event::Close(CLIENT)]
        );
    }

    #[test]
    fn test_send_before_handshake_is_dropped() {
        let mut worker = worker();
        worker.transport_mut().open(CLIENT);
        worker.on_open(CLIENT);

        worker.send_to_client(CLIENT, "too early").unwrap();
        assert!(worker.transport().written(CLIENT).is_empty());
    }

    #[test]
    fn test_send_to_open_client() {
        let mut worker = worker();
        open_client(&mut worker, CLIENT);

        worker.send_to_client(CLIENT, "hi").unwrap();
        worker.send_frame(CLIENT, OpCode::Ping, b"").unwrap();

        assert_eq!(
            worker.transport().written(CLIENT),
            &[0x81, 0x02, b'h', b'i', 0x89, 0x00]
        );
    }

    #[test]
    fn test_send_to_closed_client_errors() {
        let mut worker = worker();
        assert!(matches!(
            worker.send_to_client(ConnectionId::new(42), "x"),
            Err(Error::ConnectionClosed)
        ));
    }

    #[test]
    fn test_echo_from_callback() {
        let handler = Recorder {
            echo: true,
            ..Recorder::default()
        };
        let mut worker = worker_with(handler, Config::default());
        open_client(&mut worker, CLIENT);

        deliver(&mut worker, CLIENT, &client_frame(OpCode::Text, b"ping?"));

        let mut expected = BytesMut::new();
        encode_frame(&mut expected, OpCode::Text, b"ping?", None);
        assert_eq!(worker.transport().written(CLIENT), &expected[..]);
    }

    #[test]
    fn test_close_from_callback_stops_decoding() {
        let handler = Recorder {
            close_on: Some(&b"bye"[..]),
            ..Recorder::default()
        };
        let mut worker = worker_with(handler, Config::default());
        open_client(&mut worker, CLIENT);

        let mut data = client_frame(OpCode::Text, b"bye");
        data.extend_from_slice(&client_frame(OpCode::Text, b"ignored"));
        deliver(&mut worker, CLIENT, &data);

        assert_eq!(
            worker.handler().events,
            vec![
                Event::Open(CLIENT),
                message(CLIENT, b"bye"),
                Event::Close(CLIENT),
            ]
        );
        assert!(worker.transport().is_closed(CLIENT));
    }

    #[test]
    fn test_close_events() {
        let mut worker = worker();
        let pending = ConnectionId::new(2);
        open_client(&mut worker, CLIENT);
        worker.transport_mut().open(pending);
        worker.on_open(pending);
        assert_eq!(worker.connection_count(), 2);

        worker.on_close(pending);
        worker.on_close(CLIENT);
        worker.on_close(CLIENT);

        assert_eq!(
            worker.handler().events,
            vec![Event::Open(CLIENT), Event::Close(CLIENT)]
        );
        assert_eq!(worker.connection_count(), 0);
        // Transport-initiated closes are not echoed back to the transport
        assert!(!worker.transport().is_closed(CLIENT));
    }

    #[test]
    fn test_explicit_close() {
        let mut worker = worker();
        open_client(&mut worker, CLIENT);

        worker.close(CLIENT);

        assert!(worker.transport().is_closed(CLIENT));
        assert_eq!(worker.state(CLIENT), ConnectionState::Closed);
        assert_eq!(
            worker.handler().events,
            vec![Event::Open(CLIENT), Event::Close(CLIENT)]
        );
    }

    #[test]
    fn test_master_link() {
        let mut worker = worker();
        assert_eq!(worker.master_id(), MASTER);

        deliver(&mut worker, MASTER, b"reload");
        worker.on_master_data(Bytes::from_static(b"direct"));

        assert_eq!(
            worker.handler().events,
            vec![
                Event::Master(b"reload".to_vec()),
                Event::Master(b"direct".to_vec()),
            ]
        );
        assert!(worker.transport_mut().read_buffer(MASTER).unwrap().is_empty());
        assert_eq!(worker.connection_count(), 0);
    }

    #[test]
    fn test_send_to_master_uses_delimiter() {
        let config = Config::builder().master_delimiter("\0").build();
        let mut worker = worker_with(Recorder::default(), config);

        worker.send_to_master("stats").unwrap();
        worker.send_to_master(b"more").unwrap();

        assert_eq!(worker.transport().written(MASTER), b"stats\0more\0");
    }

    #[test]
    fn test_broadcast_skips_pending() {
        let mut worker = worker();
        let other = ConnectionId::new(2);
        let pending = ConnectionId::new(3);
        open_client(&mut worker, CLIENT);
        open_client(&mut worker, other);
        worker.transport_mut().open(pending);
        worker.on_open(pending);

        assert_eq!(worker.broadcast("all").unwrap(), 2);

        let mut expected = BytesMut::new();
        expected.put_slice(&[0x81, 0x03]);
        expected.put_slice(b"all");
        assert_eq!(worker.transport().written(CLIENT), &expected[..]);
        assert_eq!(worker.transport().written(other), &expected[..]);
        assert!(worker.transport().written(pending).is_empty());
    }

    #[test]
    fn test_data_for_unknown_connection_ignored() {
        let mut worker = worker();
        deliver(&mut worker, ConnectionId::new(77), REQUEST);

        assert!(worker.handler().events.is_empty());
        assert!(worker.transport().written(ConnectionId::new(77)).is_empty());
    }
}
