//! Echo worker
//!
//! Connects to a master process, accepts WebSocket clients and echoes every
//! text message back to its sender. Messages from the master are broadcast
//! to all clients; `stats` from a client is forwarded to the master.
//!
//! Try it with a line-based master:
//!
//! ```text
//! nc -l 9000                                  # the "master"
//! cargo run --features cli --bin echo-worker -- --master 127.0.0.1:9000
//! websocat ws://127.0.0.1:8080/
//! ```

use std::io::Write;
use std::str::FromStr;

use bytes::Bytes;
use clap::Parser;
use log::{debug, info, warn};
use tokio::net::{TcpListener, TcpStream};

use ws_worker::frame::CloseReason;
use ws_worker::prelude::*;
use ws_worker::runtime;

#[derive(Parser)]
#[command(name = "Echo Worker")]
#[command(author = "ws-worker authors")]
#[command(version = "0.1.0")]
#[command(about = "A WebSocket echo worker attached to a master process", long_about = None)]
struct Cli {
    #[arg(long, default_value_t = format!("0.0.0.0:8080"))]
    listen: String,
    #[arg(long, default_value_t = format!("127.0.0.1:9000"))]
    master: String,
    #[arg(long, default_value_t = format!("\\n"))]
    delimiter: String,
    #[arg(long)]
    strict_utf8: bool,
    #[arg(long, default_value_t = format!("INFO"))]
    log_level: String,
}

#[derive(Default)]
struct EchoHandler {
    echoed: u64,
}

impl<T: Transport> WorkerHandler<T> for EchoHandler {
    fn on_open(&mut self, ctx: &mut Context<'_, T>, id: ConnectionId) {
        info!("{} joined ({} open)", id, ctx.open_connections().len());
    }

    fn on_message(&mut self, ctx: &mut Context<'_, T>, id: ConnectionId, frame: Frame) {
        match frame.opcode() {
            OpCode::Close => {
                if let Some(reason) = frame.parse_close() {
                    debug!("{} sent close {} {:?}", id, reason.code, reason.reason);
                }
                let _ = ctx.send_frame(id, OpCode::Close, &frame.payload);
                ctx.close(id);
            }
            OpCode::Ping => {
                let _ = ctx.send_frame(id, OpCode::Pong, &frame.payload);
            }
            OpCode::Text if frame.payload.as_ref() == b"stats" => {
                let report = format!("worker echoed={} open={}", self.echoed, ctx.open_connections().len());
                if let Err(e) = ctx.send_to_master(report) {
                    warn!("failed to report to master: {}", e);
                }
            }
            OpCode::Text => {
                self.echoed += 1;
                if let Err(e) = ctx.send_to_client(id, &frame.payload) {
                    debug!("echo to {} failed: {}", id, e);
                }
            }
            other => debug!("{} sent unhandled {} frame", id, other.name()),
        }
    }

    fn on_close(&mut self, _ctx: &mut Context<'_, T>, id: ConnectionId) {
        info!("{} left", id);
    }

    fn on_master_message(&mut self, ctx: &mut Context<'_, T>, data: Bytes) {
        if data.as_ref() == b"shutdown" {
            for id in ctx.open_connections() {
                let close = Frame::close(CloseReason::GOING_AWAY, "worker shutting down");
                let _ = ctx.send_frame(id, OpCode::Close, &close.payload);
                ctx.close(id);
            }
            return;
        }

        match ctx.broadcast(&data) {
            Ok(sent) => debug!("master message relayed to {} clients", sent),
            Err(e) => warn!("broadcast failed: {}", e),
        }
    }
}

fn unescape(delimiter: &str) -> Vec<u8> {
    delimiter
        .replace("\\n", "\n")
        .replace("\\r", "\r")
        .replace("\\0", "\0")
        .into_bytes()
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level =
        log::LevelFilter::from_str(&cli.log_level).unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{}:{} [{}] - {}",
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.level(),
                record.args()
            )
        })
        .filter(None, log_level)
        .init();

    let config = Config::builder()
        .master_delimiter(unescape(&cli.delimiter))
        .close_on_invalid_utf8(cli.strict_utf8)
        .build();

    let master = TcpStream::connect(&cli.master).await?;
    master.set_nodelay(true).ok();
    let listener = TcpListener::bind(&cli.listen).await?;
    info!("echo worker on {}, master {}", cli.listen, cli.master);

    runtime::serve(listener, master, EchoHandler::default(), config).await
}
