//! Error types
//!
//! Defines domain-specific error types for the socket and client modules.

use std::fmt;
use std::io;

use crate::protocol::Reply;

/// Socket-level errors surfaced as events by `BufferedSocket`.
///
/// DNS failure and connect failure are reported as distinct conditions;
/// read errors after the peer has gone away are distinguished from a clean
/// peer-initiated close (which is not an error at all).
#[derive(Debug)]
pub enum SocketError {
    HostNotFound(String),
    ConnectionRefused(String),
    Read(io::Error),
    Write(io::Error),
    NotConnected,
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SocketError::HostNotFound(host) => write!(f, "Host not found: {}", host),
            SocketError::ConnectionRefused(host) => write!(f, "Connection refused: {}", host),
            SocketError::Read(e) => write!(f, "Socket read error: {}", e),
            SocketError::Write(e) => write!(f, "Socket write error: {}", e),
            SocketError::NotConnected => write!(f, "Socket is not connected"),
        }
    }
}

impl std::error::Error for SocketError {}

/// FTP client errors.
///
/// Protocol-level variants carry the human-readable detail string extracted
/// from the server's reply text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FtpError {
    HostNotFound(String),
    ConnectionRefused(String),
    /// Control connection dropped while an operation was in flight.
    ConnectionClosed,
    SocketRead(String),
    LoginIncorrect(String),
    FileNotFound(String),
    PermissionDenied(String),
    UnsupportedOperation(String),
    OperationFailed { code: u16, detail: String },
    ProtocolError(String),
    NotConnected,
}

impl FtpError {
    /// Maps a 4xx/5xx control reply to a typed error.
    pub fn from_reply(reply: &Reply) -> FtpError {
        match reply.code {
            530 => FtpError::LoginIncorrect(reply.text.clone()),
            550 => FtpError::FileNotFound(reply.text.clone()),
            553 => FtpError::PermissionDenied(reply.text.clone()),
            500 | 502 => FtpError::UnsupportedOperation(reply.text.clone()),
            _ => FtpError::OperationFailed {
                code: reply.code,
                detail: reply.text.clone(),
            },
        }
    }

    /// Fatal errors abort the remaining operation queue; everything queued
    /// behind the failing operation fails with the same error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            FtpError::LoginIncorrect(_)
                | FtpError::HostNotFound(_)
                | FtpError::ConnectionRefused(_)
                | FtpError::ConnectionClosed
                | FtpError::SocketRead(_)
        )
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FtpError::HostNotFound(host) => write!(f, "Host not found: {}", host),
            FtpError::ConnectionRefused(host) => write!(f, "Connection refused: {}", host),
            FtpError::ConnectionClosed => write!(f, "Connection closed by server"),
            FtpError::SocketRead(e) => write!(f, "Socket error: {}", e),
            FtpError::LoginIncorrect(detail) => write!(f, "Login incorrect: {}", detail),
            FtpError::FileNotFound(detail) => write!(f, "File not found: {}", detail),
            FtpError::PermissionDenied(detail) => write!(f, "Permission denied: {}", detail),
            FtpError::UnsupportedOperation(detail) => {
                write!(f, "Unsupported operation: {}", detail)
            }
            FtpError::OperationFailed { code, detail } => {
                write!(f, "Operation failed ({}): {}", code, detail)
            }
            FtpError::ProtocolError(detail) => write!(f, "Protocol error: {}", detail),
            FtpError::NotConnected => write!(f, "Not connected to a server"),
        }
    }
}

impl std::error::Error for FtpError {}

impl From<&SocketError> for FtpError {
    fn from(error: &SocketError) -> Self {
        match error {
            SocketError::HostNotFound(host) => FtpError::HostNotFound(host.clone()),
            SocketError::ConnectionRefused(host) => FtpError::ConnectionRefused(host.clone()),
            SocketError::Read(e) => FtpError::SocketRead(e.to_string()),
            SocketError::Write(e) => FtpError::SocketRead(format!("write failed: {}", e)),
            SocketError::NotConnected => FtpError::NotConnected,
        }
    }
}
