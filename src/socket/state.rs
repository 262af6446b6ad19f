//! Module `state`
//!
//! Connection state of a buffered socket.

/// Connection state of a `BufferedSocket`.
///
/// Transitions are driven by DNS resolution completion, connect completion,
/// and explicit `close()` calls. `Closing` means a close was requested while
/// unwritten output was still buffered; the socket closes for real once the
/// write buffer drains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Idle,
    HostLookup,
    Connecting,
    Connected,
    Closing,
}
