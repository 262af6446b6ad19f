//! Module `replies`
//!
//! Parses three-digit FTP control replies, including multiline replies of
//! the form `ddd-...` terminated by a `ddd ` line, and the PASV
//! `(h1,h2,h3,h4,p1,p2)` address tuple.

use std::net::{Ipv4Addr, SocketAddrV4};

use crate::error::FtpError;

/// A complete control-channel reply.
///
/// `text` carries the full human-readable reply text (all lines of a
/// multiline reply, joined by newlines) without the trailing CRLF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub text: String,
}

/// Reply group derived from the first digit of the code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyCategory {
    /// 1xx: the requested action has started, expect another reply.
    Preliminary,
    /// 2xx: the requested action completed.
    Success,
    /// 3xx: the command was accepted but needs a follow-up command.
    NeedMoreInfo,
    /// 4xx: the action failed but may succeed if retried later.
    TransientError,
    /// 5xx: the action failed permanently.
    PermanentError,
}

impl Reply {
    pub fn category(&self) -> ReplyCategory {
        match self.code / 100 {
            1 => ReplyCategory::Preliminary,
            2 => ReplyCategory::Success,
            3 => ReplyCategory::NeedMoreInfo,
            4 => ReplyCategory::TransientError,
            _ => ReplyCategory::PermanentError,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self.category(),
            ReplyCategory::TransientError | ReplyCategory::PermanentError
        )
    }
}

/// Accumulates control-channel lines into complete replies.
///
/// Fed one CRLF-terminated line at a time; returns a finished `Reply` once
/// the terminating line of a (possibly multiline) reply arrives.
#[derive(Debug, Default)]
pub struct ReplyAccumulator {
    code: Option<u16>,
    lines: Vec<String>,
}

impl ReplyAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed_line(&mut self, line: &str) -> Result<Option<Reply>, FtpError> {
        let trimmed = line.trim_end_matches(['\r', '\n']);

        match self.code {
            None => match split_code(trimmed) {
                Some((code, '-', text)) => {
                    self.code = Some(code);
                    self.lines.push(text.to_string());
                    Ok(None)
                }
                Some((code, _, text)) => Ok(Some(Reply {
                    code,
                    text: text.to_string(),
                })),
                None => Err(FtpError::ProtocolError(format!(
                    "malformed control reply: {:?}",
                    trimmed
                ))),
            },
            Some(code) => {
                // Inside a multiline reply every line is free-form text until
                // the `ddd ` terminator with the opening code shows up.
                if let Some((line_code, ' ', text)) = split_code(trimmed) {
                    if line_code == code {
                        self.code = None;
                        self.lines.push(text.to_string());
                        let text = self.lines.join("\n");
                        self.lines.clear();
                        return Ok(Some(Reply { code, text }));
                    }
                }
                self.lines.push(trimmed.to_string());
                Ok(None)
            }
        }
    }
}

/// Splits `ddd<sep>text` into its code, separator, and text.
fn split_code(line: &str) -> Option<(u16, char, &str)> {
    if line.len() < 3 || !line.is_char_boundary(3) {
        return None;
    }
    let code: u16 = line[..3].parse().ok()?;
    let rest = &line[3..];
    let sep = rest.chars().next().unwrap_or(' ');
    Some((code, sep, rest[sep.len_utf8().min(rest.len())..].trim_start()))
}

/// Parses the `(h1,h2,h3,h4,p1,p2)` tuple from a 227 reply text into the
/// passive-mode data connection target; the port is `p1 * 256 + p2`.
pub fn parse_pasv_addr(text: &str) -> Result<SocketAddrV4, FtpError> {
    let open = text.find('(');
    let close = text.rfind(')');
    let section = match (open, close) {
        (Some(o), Some(c)) if o < c => &text[o + 1..c],
        _ => {
            return Err(FtpError::ProtocolError(format!(
                "PASV reply without address tuple: {}",
                text
            )));
        }
    };

    let fields: Vec<&str> = section.split(',').map(str::trim).collect();
    if fields.len() != 6 {
        return Err(FtpError::ProtocolError(format!(
            "PASV tuple has {} fields, expected 6",
            fields.len()
        )));
    }

    let mut octets = [0u8; 4];
    for (slot, field) in octets.iter_mut().zip(&fields[..4]) {
        *slot = field
            .parse()
            .map_err(|_| FtpError::ProtocolError(format!("bad PASV host octet: {}", field)))?;
    }

    let mut ports = [0u16; 2];
    for (slot, field) in ports.iter_mut().zip(&fields[4..]) {
        let value: u16 = field
            .parse()
            .map_err(|_| FtpError::ProtocolError(format!("bad PASV port field: {}", field)))?;
        if value > 255 {
            return Err(FtpError::ProtocolError(format!(
                "PASV port field out of range: {}",
                value
            )));
        }
        *slot = value;
    }

    Ok(SocketAddrV4::new(
        Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
        ports[0] * 256 + ports[1],
    ))
}

/// Extracts the byte count from a 213 SIZE reply text.
pub fn parse_size_text(text: &str) -> Option<u64> {
    text.split_whitespace().next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_line_reply() {
        let mut acc = ReplyAccumulator::new();
        let reply = acc
            .feed_line("220 Service ready\r\n")
            .unwrap()
            .expect("complete reply");
        assert_eq!(reply.code, 220);
        assert_eq!(reply.text, "Service ready");
        assert_eq!(reply.category(), ReplyCategory::Success);
    }

    #[test]
    fn test_multiline_reply() {
        let mut acc = ReplyAccumulator::new();
        assert!(acc.feed_line("230-Welcome\r\n").unwrap().is_none());
        assert!(acc.feed_line("Some banner text\r\n").unwrap().is_none());
        // A different code inside the body is still body text.
        assert!(acc.feed_line("221 not the end\r\n").unwrap().is_none());
        let reply = acc
            .feed_line("230 Login successful\r\n")
            .unwrap()
            .expect("terminated");
        assert_eq!(reply.code, 230);
        assert!(reply.text.contains("Welcome"));
        assert!(reply.text.ends_with("Login successful"));
    }

    #[test]
    fn test_malformed_reply_is_protocol_error() {
        let mut acc = ReplyAccumulator::new();
        assert!(acc.feed_line("oops no code\r\n").is_err());
        assert!(acc.feed_line("12 short\r\n").is_err());
    }

    #[test]
    fn test_reply_categories() {
        let codes = [
            (150, ReplyCategory::Preliminary),
            (226, ReplyCategory::Success),
            (331, ReplyCategory::NeedMoreInfo),
            (426, ReplyCategory::TransientError),
            (550, ReplyCategory::PermanentError),
        ];
        for (code, category) in codes {
            let reply = Reply {
                code,
                text: String::new(),
            };
            assert_eq!(reply.category(), category);
        }
    }

    #[test]
    fn test_parse_pasv_addr() {
        let addr = parse_pasv_addr("Entering Passive Mode (127,0,0,1,200,50).").unwrap();
        assert_eq!(*addr.ip(), Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(addr.port(), 200 * 256 + 50);
        assert_eq!(addr.port(), 51250);
    }

    #[test]
    fn test_parse_pasv_addr_rejects_garbage() {
        assert!(parse_pasv_addr("Entering Passive Mode").is_err());
        assert!(parse_pasv_addr("(1,2,3,4,5)").is_err());
        assert!(parse_pasv_addr("(1,2,3,4,5,999)").is_err());
        assert!(parse_pasv_addr("(a,b,c,d,e,f)").is_err());
    }

    #[test]
    fn test_parse_size_text() {
        assert_eq!(parse_size_text("4096"), Some(4096));
        assert_eq!(parse_size_text("  1234  "), Some(1234));
        assert_eq!(parse_size_text("not-a-number"), None);
    }
}
