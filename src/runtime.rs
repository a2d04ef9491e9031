//! Tokio driver for a worker
//!
//! Socket I/O runs in small per-connection tasks, but every event is funnelled
//! through one channel into the task that owns the [`Worker`], so the engine
//! itself stays single-threaded.
//!
//! ```text
//!  client reader tasks ─┐                         ┌─> client writer tasks
//!  master reader task  ─┼─> events ─> Worker ─────┤
//!  accept loop         ─┘                         └─> master writer task
//! ```
//!
//! Inbound master traffic is split on the configured delimiter, so
//! `on_master_message` sees one call per message sent by the master.
//!
//! # Example
//!
//! ```ignore
//! use tokio::net::{TcpListener, TcpStream};
//! use ws_worker::{Config, runtime};
//!
//! let listener = TcpListener::bind("0.0.0.0:8080").await?;
//! let master = TcpStream::connect("127.0.0.1:9000").await?;
//! runtime::serve(listener, master, MyHandler::default(), Config::default()).await?;
//! ```

use std::collections::HashMap;

use bytes::{Buf, Bytes, BytesMut};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::Config;
use crate::connection::ConnectionId;
use crate::error::{Error, Result};
use crate::transport::Transport;
use crate::worker::{Worker, WorkerHandler};

/// Connection id reserved for the master link
pub const MASTER_ID: ConnectionId = ConnectionId::new(0);

/// Event delivered to the worker task
#[derive(Debug)]
enum Event {
    Data(ConnectionId, Bytes),
    Closed(ConnectionId),
    MasterMessage(Bytes),
    MasterClosed,
}

/// Command for a writer task
#[derive(Debug)]
enum Outgoing {
    Data(Bytes),
    Close,
}

struct Peer {
    read: BytesMut,
    tx: mpsc::UnboundedSender<Outgoing>,
    reader: Option<AbortHandle>,
}

/// [`Transport`] backed by per-connection writer tasks
///
/// Writes are queued on unbounded channels drained by a writer task that
/// owns the socket write half. The queue of a slow client grows without
/// limit; backpressure is left to whoever embeds the transport.
#[derive(Default)]
pub struct ChannelTransport {
    peers: HashMap<ConnectionId, Peer>,
}

impl ChannelTransport {
    /// Create an empty transport
    pub fn new() -> Self {
        Self::default()
    }

    fn register(
        &mut self,
        id: ConnectionId,
        tx: mpsc::UnboundedSender<Outgoing>,
        reader: Option<AbortHandle>,
    ) {
        self.peers.insert(
            id,
            Peer {
                read: BytesMut::new(),
                tx,
                reader,
            },
        );
    }

    /// Append received bytes; `false` if the connection is gone
    fn append(&mut self, id: ConnectionId, data: &[u8]) -> bool {
        match self.peers.get_mut(&id) {
            Some(peer) => {
                peer.read.extend_from_slice(data);
                true
            }
            None => false,
        }
    }

    /// Drop a connection the peer already closed
    fn remove(&mut self, id: ConnectionId) {
        self.peers.remove(&id);
    }

    /// Number of registered connections, master link included
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if no connection is registered
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

impl Transport for ChannelTransport {
    type Handle = ConnectionId;

    fn connection_id(&self, handle: &ConnectionId) -> ConnectionId {
        *handle
    }

    fn read_buffer(&mut self, id: ConnectionId) -> Option<&mut BytesMut> {
        self.peers.get_mut(&id).map(|peer| &mut peer.read)
    }

    fn write(&mut self, id: ConnectionId, data: &[u8]) -> Result<()> {
        let peer = self.peers.get(&id).ok_or(Error::UnknownConnection(id))?;
        peer.tx
            .send(Outgoing::Data(Bytes::copy_from_slice(data)))
            .map_err(|_| Error::ConnectionClosed)
    }

    fn close(&mut self, id: ConnectionId) {
        if let Some(peer) = self.peers.remove(&id) {
            if let Some(reader) = peer.reader {
                reader.abort();
            }
            let _ = peer.tx.send(Outgoing::Close);
        }
    }
}

/// Run a worker until its master link closes
///
/// Accepts clients from `listener`, assigns ids starting at 1 and feeds all
/// traffic to `handler`. Returns `Ok(())` once the master closes the link.
pub async fn serve<M, H>(listener: TcpListener, master: M, handler: H, config: Config) -> Result<()>
where
    M: AsyncRead + AsyncWrite + Send + 'static,
    H: WorkerHandler<ChannelTransport>,
{
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<Event>();
    let read_size = config.read_buffer_size.max(1);

    let (master_rd, master_wr) = tokio::io::split(master);
    let master_reader = tokio::spawn(read_master(
        master_rd,
        config.master_delimiter.clone(),
        read_size,
        events_tx.clone(),
    ));

    let mut transport = ChannelTransport::new();
    transport.register(
        MASTER_ID,
        spawn_writer(MASTER_ID, master_wr),
        Some(master_reader.abort_handle()),
    );

    let mut worker = Worker::new(transport, &MASTER_ID, handler, config);
    let mut next_id: u64 = MASTER_ID.get() + 1;

    if let Ok(addr) = listener.local_addr() {
        debug!("worker listening on {}", addr);
    }

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("listener accept error {}", e);
                        return Err(e.into());
                    }
                };
                stream.set_nodelay(true).ok();

                let id = ConnectionId::new(next_id);
                next_id += 1;

                let (rd, wr) = stream.into_split();
                let reader = tokio::spawn(read_client(id, rd, read_size, events_tx.clone()));
                worker
                    .transport_mut()
                    .register(id, spawn_writer(id, wr), Some(reader.abort_handle()));
                trace!("accepted {} from {}", id, peer_addr);
                worker.on_open(id);
            }
            event = events_rx.recv() => {
                match event {
                    Some(Event::Data(id, data)) => {
                        if worker.transport_mut().append(id, &data) {
                            worker.on_data(id);
                        }
                    }
                    Some(Event::Closed(id)) => {
                        worker.transport_mut().remove(id);
                        worker.on_close(id);
                    }
                    Some(Event::MasterMessage(data)) => worker.on_master_data(data),
                    Some(Event::MasterClosed) | None => {
                        debug!("master link closed, worker shutting down");
                        worker.close(MASTER_ID);
                        return Ok(());
                    }
                }
            }
        }
    }
}

fn spawn_writer<W>(id: ConnectionId, mut wr: W) -> mpsc::UnboundedSender<Outgoing>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<Outgoing>();

    tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outgoing::Data(data) => {
                    if let Err(e) = wr.write_all(&data).await {
                        warn!("stream write error on {}: {}", id, e);
                        break;
                    }
                    trace!("stream write {} bytes to {}", data.len(), id);
                }
                Outgoing::Close => break,
            }
        }
        let _ = wr.shutdown().await;
        trace!("writer for {} exit loop", id);
    });

    tx
}

async fn read_client<R>(
    id: ConnectionId,
    mut rd: R,
    read_size: usize,
    events: mpsc::UnboundedSender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(read_size);

    loop {
        buf.reserve(read_size);
        match rd.read_buf(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                trace!("stream read {} bytes from {}", n, id);
                if events.send(Event::Data(id, buf.split().freeze())).is_err() {
                    return;
                }
            }
            Err(e) => {
                warn!("stream read error on {}: {}", id, e);
                break;
            }
        }
    }

    let _ = events.send(Event::Closed(id));
}

async fn read_master<R>(
    mut rd: R,
    delimiter: Bytes,
    read_size: usize,
    events: mpsc::UnboundedSender<Event>,
) where
    R: AsyncRead + Unpin,
{
    let mut pending = BytesMut::with_capacity(read_size);

    loop {
        pending.reserve(read_size);
        match rd.read_buf(&mut pending).await {
            Ok(0) => break,
            Ok(n) => {
                trace!("master read {} bytes", n);
                for message in split_delimited(&mut pending, &delimiter) {
                    if events.send(Event::MasterMessage(message)).is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                warn!("master read error: {}", e);
                break;
            }
        }
    }

    let _ = events.send(Event::MasterClosed);
}

/// Pop every complete delimiter-terminated message off the front of `buf`
///
/// Delimiters are stripped; an unterminated tail stays in `buf`. An empty
/// delimiter makes the whole buffer one message.
pub fn split_delimited(buf: &mut BytesMut, delimiter: &[u8]) -> Vec<Bytes> {
    if delimiter.is_empty() {
        if buf.is_empty() {
            return Vec::new();
        }
        return vec![buf.split().freeze()];
    }

    let mut messages = Vec::new();
    while let Some(pos) = buf
        .windows(delimiter.len())
        .position(|window| window == delimiter)
    {
        let message = buf.split_to(pos).freeze();
        buf.advance(delimiter.len());
        messages.push(message);
    }
    messages
}
