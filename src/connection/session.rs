//! Per-Connection Session
//!
//! Each accepted socket is driven by one [`Session`] on its own task.
//! The session loops through a fixed state machine:
//!
//! ```text
//!   reading ──> dispatching ──> writing ──> reading ...
//!      │                                       │
//!      ├── codec fault: error reply, close     │
//!      ├── QUIT: reply flushed, close          │
//!      └── transport fault / shutdown: close ──┘
//! ```
//!
//! TCP is a stream, so the read buffer may hold half a request or
//! several pipelined ones; the decoder is resumable either way. Requests
//! are executed strictly in receipt order and each reply is flushed in
//! full before the next request is taken, so replies can never
//! interleave or reorder within a connection.
//!
//! Error handling follows the protocol contract: a framing fault gets an
//! `ERR Protocol error` reply and the connection is closed; a command
//! fault (unknown name, bad arity, bad integer) is just a reply and the
//! connection stays; a transport fault drops the connection silently.

use crate::commands::{CommandHandler, Control};
use crate::shutdown::Shutdown;
use crate::wire::{DecodeError, Decoder, Frame};
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

/// Cap on buffered unparsed request bytes per connection
const MAX_REQUEST_BYTES: usize = 4 * 1024 * 1024;

/// Initial read buffer capacity
const INITIAL_BUFFER_BYTES: usize = 4096;

/// Server-wide connection counters.
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Connections accepted since startup
    pub accepted: AtomicU64,
    /// Connections currently live
    pub active: AtomicU64,
    /// Requests dispatched since startup
    pub commands: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    fn connection_opened(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    fn connection_closed(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    fn command_processed(&self) {
        self.commands.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of currently live sessions.
    pub fn live_sessions(&self) -> u64 {
        self.active.load(Ordering::Relaxed)
    }
}

/// Reasons a session ends.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] DecodeError),

    /// Peer closed the socket between requests
    #[error("peer closed the connection")]
    PeerClosed,

    /// Peer closed the socket in the middle of a frame
    #[error("connection closed mid-frame")]
    TruncatedFrame,

    /// The peer sent more unframed bytes than the buffer cap allows
    #[error("request exceeds {} bytes", MAX_REQUEST_BYTES)]
    RequestTooLarge,
}

/// State for one accepted connection.
pub struct Session {
    stream: BufWriter<TcpStream>,
    addr: SocketAddr,
    buffer: BytesMut,
    decoder: Decoder,
    commands: CommandHandler,
    shutdown: Arc<Shutdown>,
    signal: watch::Receiver<bool>,
    stats: Arc<ConnectionStats>,
    /// Reused reply encoding buffer
    out: Vec<u8>,
}

impl Session {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        commands: CommandHandler,
        shutdown: Arc<Shutdown>,
        stats: Arc<ConnectionStats>,
    ) -> Self {
        stats.connection_opened();
        let signal = shutdown.subscribe();
        Self {
            stream: BufWriter::new(stream),
            addr,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_BYTES),
            decoder: Decoder::new(),
            commands,
            shutdown,
            signal,
            stats,
            out: Vec::new(),
        }
    }

    /// Drives the session to completion.
    pub async fn run(mut self) -> Result<(), SessionError> {
        info!(client = %self.addr, "client connected");

        let result = self.serve().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "session closed"),
            Err(SessionError::PeerClosed) => debug!(client = %self.addr, "peer disconnected"),
            Err(SessionError::Io(e)) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                debug!(client = %self.addr, "connection reset by peer")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "session ended with error"),
        }

        self.stats.connection_closed();
        result
    }

    async fn serve(&mut self) -> Result<(), SessionError> {
        loop {
            // Drain every complete request already buffered before
            // touching the socket again.
            loop {
                let frame = match self.next_request() {
                    Ok(Some(frame)) => frame,
                    Ok(None) => break,
                    Err(fault) => return self.fail_protocol(fault).await,
                };

                // Blank inline lines decode to empty requests; ignore them.
                if matches!(&frame, Frame::Array(items) if items.is_empty()) {
                    continue;
                }

                let (reply, control) = self.commands.execute(frame);
                self.stats.command_processed();
                self.write_frame(&reply).await?;

                match control {
                    Control::Continue => {}
                    Control::Quit => {
                        debug!(client = %self.addr, "client quit");
                        return Ok(());
                    }
                    Control::Shutdown => {
                        info!(client = %self.addr, "shutdown requested");
                        self.shutdown.trigger();
                        return Ok(());
                    }
                }
            }

            if self.buffer.len() >= MAX_REQUEST_BYTES {
                let reply = Frame::error("ERR Protocol error: request too large");
                let _ = self.write_frame(&reply).await;
                return Err(SessionError::RequestTooLarge);
            }

            let read = tokio::select! {
                read = self.stream.get_mut().read_buf(&mut self.buffer) => read?,
                _ = self.signal.wait_for(|stop| *stop) => {
                    debug!(client = %self.addr, "server shutting down, closing session");
                    return Ok(());
                }
            };
            if read == 0 {
                return if self.buffer.is_empty() {
                    Err(SessionError::PeerClosed)
                } else {
                    Err(SessionError::TruncatedFrame)
                };
            }
            trace!(client = %self.addr, bytes = read, "read");
        }
    }

    /// Tries to decode the next buffered request.
    fn next_request(&mut self) -> Result<Option<Frame>, DecodeError> {
        if self.buffer.is_empty() {
            return Ok(None);
        }
        match self.decoder.decode(&self.buffer)? {
            Some((frame, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                trace!(
                    client = %self.addr,
                    consumed,
                    pending = self.buffer.len(),
                    "decoded request"
                );
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Reports a framing fault to the peer, then fails the session.
    async fn fail_protocol(&mut self, fault: DecodeError) -> Result<(), SessionError> {
        warn!(client = %self.addr, error = %fault, "protocol fault, closing connection");
        let reply = Frame::error(format!("ERR Protocol error: {}", fault));
        // Best effort; the peer may already be gone.
        let _ = self.write_frame(&reply).await;
        Err(SessionError::Protocol(fault))
    }

    /// Writes one reply and flushes it in full before returning.
    async fn write_frame(&mut self, frame: &Frame) -> Result<(), SessionError> {
        self.out.clear();
        frame.encode_into(&mut self.out);
        self.stream.write_all(&self.out).await?;
        self.stream.flush().await?;
        Ok(())
    }
}

/// Runs one connection to completion, logging unexpected endings.
///
/// This is the entry point the accept loop spawns for every socket.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    commands: CommandHandler,
    shutdown: Arc<Shutdown>,
    stats: Arc<ConnectionStats>,
) {
    let session = Session::new(stream, addr, commands, shutdown, stats);
    if let Err(e) = session.run().await {
        match e {
            SessionError::PeerClosed => {}
            SessionError::Io(ref io) if io.kind() == std::io::ErrorKind::ConnectionReset => {}
            _ => debug!(client = %addr, error = %e, "connection ended with error"),
        }
    }
}
