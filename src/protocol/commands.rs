//! Module `commands`
//!
//! Control-channel commands emitted by the client, serialized as literal
//! CRLF-terminated lines.

/// An FTP control command ready to be put on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolCommand {
    User(String),
    Pass(String),
    /// TYPE I: binary (image) transfers.
    TypeImage,
    /// TYPE A: ASCII transfers, used for directory listings.
    TypeAscii,
    Pasv,
    List(Option<String>),
    Retr(String),
    Stor(String),
    Dele(String),
    Rnfr(String),
    Rnto(String),
    Mkd(String),
    Cwd(String),
    Size(String),
    Quit,
}

impl ProtocolCommand {
    /// Serializes the command to its wire form, CRLF included.
    pub fn to_wire(&self) -> String {
        match self {
            ProtocolCommand::User(name) => format!("USER {}\r\n", name),
            ProtocolCommand::Pass(pass) => format!("PASS {}\r\n", pass),
            ProtocolCommand::TypeImage => "TYPE I\r\n".to_string(),
            ProtocolCommand::TypeAscii => "TYPE A\r\n".to_string(),
            ProtocolCommand::Pasv => "PASV\r\n".to_string(),
            ProtocolCommand::List(None) => "LIST\r\n".to_string(),
            ProtocolCommand::List(Some(path)) => format!("LIST {}\r\n", path),
            ProtocolCommand::Retr(path) => format!("RETR {}\r\n", path),
            ProtocolCommand::Stor(path) => format!("STOR {}\r\n", path),
            ProtocolCommand::Dele(path) => format!("DELE {}\r\n", path),
            ProtocolCommand::Rnfr(path) => format!("RNFR {}\r\n", path),
            ProtocolCommand::Rnto(path) => format!("RNTO {}\r\n", path),
            ProtocolCommand::Mkd(path) => format!("MKD {}\r\n", path),
            ProtocolCommand::Cwd(path) => format!("CWD {}\r\n", path),
            ProtocolCommand::Size(path) => format!("SIZE {}\r\n", path),
            ProtocolCommand::Quit => "QUIT\r\n".to_string(),
        }
    }

    /// Password arguments must not leak into logs.
    pub fn to_log_line(&self) -> String {
        match self {
            ProtocolCommand::Pass(_) => "PASS ****".to_string(),
            other => other.to_wire().trim_end().to_string(),
        }
    }
}
