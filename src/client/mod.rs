//! FTP client core
//!
//! The sequential operation queue, the per-operation reply state machine,
//! and the events it emits.

pub mod events;
pub mod machine;
pub mod operations;
pub mod state;

pub use events::ClientEvent;
pub use machine::FtpClient;
pub use operations::{Operation, OperationId, OperationKind, OperationQueue, OperationState};
pub use state::ClientState;
