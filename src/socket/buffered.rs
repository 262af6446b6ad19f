//! Module `buffered`
//!
//! Implements `BufferedSocket`: a non-blocking TCP stream with automatic
//! local buffering on both directions. Unread incoming bytes accumulate in
//! a read buffer trimmed from the front on consumption; outgoing bytes are
//! queued as chunks, coalescing small writes and flushing immediately once
//! the pending size crosses the flush threshold. All progress happens in
//! discrete readiness passes driven by `process()`.

use log::{debug, warn};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::SocketAddr;
use tokio::io::Interest;
use tokio::net::{TcpStream, lookup_host};

use crate::error::SocketError;
use crate::socket::events::SocketEvent;
use crate::socket::state::SocketState;

const READ_CHUNK: usize = 4096;

/// Default pending-write size above which `write()` stops coalescing and
/// attempts an immediate flush. One Ethernet-ish segment keeps small
/// interactive commands cheap without batching large payloads.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 1460;

/// A buffered stream abstraction over a non-blocking OS socket.
///
/// `connect_to_host`, `write`, `read`, `read_line` and `close` all return
/// without blocking; actual connection and transfer progress happen
/// incrementally across `process()` passes. Outcomes are reported through
/// `SocketEvent`s drained by the caller.
pub struct BufferedSocket {
    stream: Option<TcpStream>,
    state: SocketState,
    read_buffer: Vec<u8>,
    write_queue: VecDeque<Vec<u8>>,
    pending_write: usize,
    /// Cap on buffered unread bytes; 0 means unbounded.
    read_limit: usize,
    flush_threshold: usize,
    events: VecDeque<SocketEvent>,
}

impl Default for BufferedSocket {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferedSocket {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_FLUSH_THRESHOLD, 0)
    }

    /// Creates a socket with an explicit flush threshold and read-buffer cap
    /// (0 = unbounded).
    pub fn with_limits(flush_threshold: usize, read_limit: usize) -> Self {
        Self {
            stream: None,
            state: SocketState::Idle,
            read_buffer: Vec::new(),
            write_queue: VecDeque::new(),
            pending_write: 0,
            read_limit,
            flush_threshold: flush_threshold.max(1),
            events: VecDeque::new(),
        }
    }

    pub fn state(&self) -> SocketState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        matches!(self.state, SocketState::Connected | SocketState::Closing)
    }

    /// Number of buffered unread bytes.
    pub fn bytes_available(&self) -> usize {
        self.read_buffer.len()
    }

    /// Number of queued bytes not yet accepted by the OS.
    pub fn bytes_to_write(&self) -> usize {
        self.pending_write
    }

    pub fn can_read_line(&self) -> bool {
        self.read_buffer.contains(&b'\n')
    }

    pub fn set_read_buffer_limit(&mut self, limit: usize) {
        self.read_limit = limit;
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.stream.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Resolves `host` and attempts a connection against each candidate
    /// address, IPv4 candidates before IPv6, until one succeeds.
    ///
    /// Failures surface as events rather than a return value: an empty or
    /// failed resolution emits `Error(HostNotFound)`, exhausting all
    /// candidates emits `Error(ConnectionRefused)`.
    pub async fn connect_to_host(&mut self, host: &str, port: u16) {
        if self.state != SocketState::Idle {
            warn!("connect_to_host called while socket is {:?}", self.state);
            return;
        }

        self.state = SocketState::HostLookup;
        debug!("Resolving {}:{}", host, port);

        let addrs: Vec<SocketAddr> = match lookup_host((host, port)).await {
            Ok(iter) => iter.collect(),
            Err(e) => {
                debug!("Resolution of {} failed: {}", host, e);
                self.state = SocketState::Idle;
                self.events
                    .push_back(SocketEvent::Error(SocketError::HostNotFound(
                        host.to_string(),
                    )));
                return;
            }
        };

        if addrs.is_empty() {
            self.state = SocketState::Idle;
            self.events
                .push_back(SocketEvent::Error(SocketError::HostNotFound(
                    host.to_string(),
                )));
            return;
        }

        self.events.push_back(SocketEvent::HostFound);
        self.state = SocketState::Connecting;

        let (v4, v6): (Vec<SocketAddr>, Vec<SocketAddr>) =
            addrs.into_iter().partition(|a| a.is_ipv4());

        for addr in v4.into_iter().chain(v6) {
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    debug!("Connected to {}", addr);
                    self.stream = Some(stream);
                    self.state = SocketState::Connected;
                    self.events.push_back(SocketEvent::Connected);
                    // Anything queued before the connection completed goes
                    // out on the first opportunity.
                    if self.pending_write > 0 {
                        self.try_flush();
                    }
                    return;
                }
                Err(e) => {
                    debug!("Connect attempt to {} failed: {}", addr, e);
                }
            }
        }

        self.state = SocketState::Idle;
        self.events
            .push_back(SocketEvent::Error(SocketError::ConnectionRefused(format!(
                "{}:{}",
                host, port
            ))));
    }

    /// Queues `data` for transmission, preserving byte order across calls.
    ///
    /// Chunks are coalesced while the aggregate pending size stays below the
    /// flush threshold; crossing it triggers an immediate non-blocking flush
    /// attempt. Never blocks.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        match self.write_queue.back_mut() {
            Some(last) if last.len() + data.len() <= self.flush_threshold => {
                last.extend_from_slice(data);
            }
            _ => self.write_queue.push_back(data.to_vec()),
        }
        self.pending_write += data.len();

        if self.pending_write >= self.flush_threshold {
            self.try_flush();
        }
    }

    /// Consumes and returns up to `max` buffered bytes. Returns an empty
    /// vector if the read buffer is empty; never blocks.
    pub fn read(&mut self, max: usize) -> Vec<u8> {
        let n = max.min(self.read_buffer.len());
        self.read_buffer.drain(..n).collect()
    }

    /// Consumes and returns all buffered bytes.
    pub fn read_all(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.read_buffer)
    }

    /// Consumes one full line including its terminating newline.
    ///
    /// Returns `None` without consuming anything when no complete line is
    /// buffered.
    pub fn read_line(&mut self) -> Option<Vec<u8>> {
        let pos = self.read_buffer.iter().position(|&b| b == b'\n')?;
        Some(self.read_buffer.drain(..=pos).collect())
    }

    /// Requests a close. With a drained write buffer the socket closes
    /// immediately; otherwise it transitions to `Closing` and the actual
    /// close is deferred until pending output is flushed, then `Closed`
    /// fires.
    pub fn close(&mut self) {
        if self.stream.is_none() {
            self.state = SocketState::Idle;
            return;
        }
        if self.pending_write == 0 {
            self.finish_close();
        } else {
            debug!(
                "Deferring close: {} bytes still unwritten",
                self.pending_write
            );
            self.state = SocketState::Closing;
        }
    }

    /// Immediately tears the socket down, discarding both buffers and any
    /// queued events. Used when the owner abandons the connection.
    pub fn reset(&mut self) {
        self.stream = None;
        self.state = SocketState::Idle;
        self.read_buffer.clear();
        self.write_queue.clear();
        self.pending_write = 0;
        self.events.clear();
    }

    /// Runs one readiness pass and returns the events it produced.
    ///
    /// Awaits readiness at most once, drains available incoming bytes into
    /// the read buffer (bounded by the read-buffer cap), writes as much
    /// pending output as the OS accepts, and completes a deferred close once
    /// the write buffer drains.
    pub async fn process(&mut self) -> Vec<SocketEvent> {
        self.run_pass().await;
        self.take_events()
    }

    /// Drains events produced since the last call.
    pub fn take_events(&mut self) -> Vec<SocketEvent> {
        self.events.drain(..).collect()
    }

    async fn run_pass(&mut self) {
        if !self.is_connected() {
            return;
        }

        let mut interest = Interest::READABLE;
        if self.pending_write > 0 {
            interest |= Interest::WRITABLE;
        }

        let ready = match &self.stream {
            Some(stream) => match stream.ready(interest).await {
                Ok(ready) => ready,
                Err(e) => {
                    self.events
                        .push_back(SocketEvent::Error(SocketError::Read(e)));
                    return;
                }
            },
            None => return,
        };

        if ready.is_readable() {
            self.drain_incoming();
        }
        if ready.is_writable() && self.pending_write > 0 {
            self.try_flush();
        }

        if self.state == SocketState::Closing && self.pending_write == 0 {
            self.finish_close();
        }
    }

    /// Moves every readable byte from the OS into the read buffer, stopping
    /// at the read-buffer cap. Emits at most one `ReadyRead` per pass.
    fn drain_incoming(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        let mut received = 0usize;
        let mut peer_closed = false;
        let mut read_error = None;
        let mut buf = [0u8; READ_CHUNK];

        loop {
            let room = if self.read_limit > 0 {
                if self.read_buffer.len() >= self.read_limit {
                    break;
                }
                READ_CHUNK.min(self.read_limit - self.read_buffer.len())
            } else {
                READ_CHUNK
            };

            match stream.try_read(&mut buf[..room]) {
                Ok(0) => {
                    peer_closed = true;
                    break;
                }
                Ok(n) => {
                    self.read_buffer.extend_from_slice(&buf[..n]);
                    received += n;
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                    // Peer went away without a FIN; treated as a close, not
                    // an I/O failure.
                    peer_closed = true;
                    break;
                }
                Err(e) => {
                    read_error = Some(e);
                    break;
                }
            }
        }

        if received > 0 {
            self.events.push_back(SocketEvent::ReadyRead);
        }
        if peer_closed {
            debug!("Peer closed the connection");
            self.stream = None;
            self.state = SocketState::Idle;
            self.write_queue.clear();
            self.pending_write = 0;
            self.events.push_back(SocketEvent::ConnectionClosed);
        } else if let Some(e) = read_error {
            self.stream = None;
            self.state = SocketState::Idle;
            self.events
                .push_back(SocketEvent::Error(SocketError::Read(e)));
        }
    }

    /// Writes as much of the pending queue as the OS accepts right now.
    fn try_flush(&mut self) {
        let Some(stream) = self.stream.as_ref() else {
            return;
        };

        let mut written = 0usize;
        while let Some(chunk) = self.write_queue.front_mut() {
            match stream.try_write(chunk) {
                Ok(n) => {
                    written += n;
                    self.pending_write -= n;
                    if n == chunk.len() {
                        self.write_queue.pop_front();
                    } else {
                        chunk.drain(..n);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.events
                        .push_back(SocketEvent::Error(SocketError::Write(e)));
                    break;
                }
            }
        }

        if written > 0 {
            self.events.push_back(SocketEvent::BytesWritten(written));
        }
    }

    fn finish_close(&mut self) {
        self.stream = None;
        self.state = SocketState::Idle;
        self.events.push_back(SocketEvent::Closed);
    }
}
