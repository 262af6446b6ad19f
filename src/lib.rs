pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod socket;

pub use client::{ClientEvent, ClientState, FtpClient, OperationId, OperationKind, OperationState};
pub use config::ClientConfig;
pub use error::{FtpError, SocketError};
pub use protocol::{EntryKind, FileEntry, Reply};
pub use socket::{BufferedSocket, SocketEvent, SocketState};
