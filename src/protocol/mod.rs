//! FTP protocol plumbing
//!
//! Reply parsing and categorization, control command serialization, PASV
//! tuple parsing, and directory listing parsing.

pub mod commands;
pub mod listing;
pub mod replies;

pub use commands::ProtocolCommand;
pub use listing::{EntryKind, FileEntry, Permissions, parse_list_line};
pub use replies::{Reply, ReplyAccumulator, ReplyCategory, parse_pasv_addr, parse_size_text};
