//! Module `state`
//!
//! Connection-level state of the FTP client.

/// Where the client stands with the server.
///
/// `LoggedIn` is `Connected` plus a completed USER/PASS exchange; data
/// transfers require it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Unconnected,
    HostLookup,
    Connecting,
    Connected,
    LoggedIn,
    Closing,
}
