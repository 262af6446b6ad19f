//! Module `events`
//!
//! Events emitted by `BufferedSocket` and drained by its owner once per
//! processing pass.

use crate::error::SocketError;

/// Notification emitted by a `BufferedSocket`.
///
/// Each kind is delivered at most once per processing pass, so a consumer
/// polling the socket sees no reentrant event storms.
#[derive(Debug)]
pub enum SocketEvent {
    /// DNS resolution produced at least one candidate address.
    HostFound,
    /// A connection attempt succeeded.
    Connected,
    /// New bytes were appended to the read buffer this pass.
    ReadyRead,
    /// Bytes accepted by the OS from the write buffer this pass.
    BytesWritten(usize),
    /// The peer closed the connection cleanly.
    ConnectionClosed,
    /// A deferred or immediate close finished; the socket is idle again.
    Closed,
    Error(SocketError),
}
