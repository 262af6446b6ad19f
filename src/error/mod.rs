//! Error handling
//!
//! Defines error types for the socket layer and the FTP client layer.

pub mod types;

pub use types::*;
