//! Module `events`
//!
//! Events emitted by `FtpClient` and returned from each `process()` pass.
//! Consumers match on these instead of registering callbacks; delivery is
//! at most once per pass per underlying readiness notification.

use crate::client::operations::OperationId;
use crate::client::state::ClientState;
use crate::error::FtpError;
use crate::protocol::{FileEntry, Reply};

/// Notification emitted by the FTP client.
#[derive(Debug)]
pub enum ClientEvent {
    StateChanged(ClientState),
    OperationStarted(OperationId),
    /// Terminal notification for an operation; fires exactly once per
    /// submitted operation. `data` carries the downloaded payload for `Get`.
    OperationFinished {
        id: OperationId,
        error: Option<FtpError>,
        data: Vec<u8>,
    },
    /// One parsed entry of a LIST transfer.
    ListEntry(FileEntry),
    /// Cumulative transfer progress; `total` comes from a SIZE probe when
    /// the server supports one.
    TransferProgress {
        id: OperationId,
        done: u64,
        total: Option<u64>,
    },
    /// Every complete control reply, for consumers that want the raw
    /// protocol exchange.
    RawReply(Reply),
}
