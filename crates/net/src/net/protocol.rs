use std::fmt;
use std::io;
use std::str::FromStr;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

use crate::error::NetError;

pub const DEFAULT_CONTROL_PORT: u16 = 53001;
pub const DEFAULT_DATA_PORT: u16 = 50333;
pub const DEFAULT_PACKET_LENGTH: usize = 1024;
/// Largest payload a single IPv4 UDP datagram can carry.
pub const MAX_PACKET_LENGTH: usize = 65507;

pub const MAX_CONTROL_LINE: usize = 256;

/// Returns 0 on EOF. A line without its terminator was cut short by EOF or the length limit.
pub async fn read_control_line<R>(reader: &mut R, line: &mut String) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin,
{
    line.clear();
    reader.take(MAX_CONTROL_LINE as u64).read_line(line).await
}

pub fn encode_handshake(data_port: u16) -> String {
    if data_port == DEFAULT_DATA_PORT {
        String::from("\n")
    } else {
        format!("{}\n", data_port)
    }
}

/// `None` means "keep the default". A missing terminator means the hub hung up mid-handshake.
pub fn parse_handshake(line: &str) -> Result<Option<u16>, NetError> {
    let Some(body) = line.strip_suffix('\n') else {
        return Err(NetError::ProtocolViolation(if line.is_empty() {
            String::from("connection closed before handshake line")
        } else {
            format!("unterminated handshake line {:?}", line)
        }));
    };
    let body = body.strip_suffix('\r').unwrap_or(body);

    if body.is_empty() {
        return Ok(None);
    }

    match body.parse::<u16>() {
        Ok(0) | Err(_) => Err(NetError::ProtocolViolation(format!(
            "invalid data port in handshake: {:?}",
            body
        ))),
        Ok(port) => Ok(Some(port)),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    Port(u16),
    Join(String),
    Ready(bool),
    Leave,
    Start,
}

impl ControlEvent {
    pub fn to_line(&self) -> String {
        format!("{}\n", self)
    }
}

impl fmt::Display for ControlEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlEvent::Port(port) => write!(f, "PORT {}", port),
            ControlEvent::Join(username) => write!(f, "JOIN {}", username),
            ControlEvent::Ready(ready) => write!(f, "READY {}", ready),
            ControlEvent::Leave => f.write_str("LEAVE"),
            ControlEvent::Start => f.write_str("START"),
        }
    }
}

impl FromStr for ControlEvent {
    type Err = NetError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, Some(arg)),
            None => (line, None),
        };

        let event = match (verb, arg) {
            ("PORT", Some(arg)) => match arg.parse::<u16>() {
                Ok(port) if port != 0 => ControlEvent::Port(port),
                _ => return Err(violation(line)),
            },
            ("JOIN", Some(name)) if is_valid_username(name) => ControlEvent::Join(name.to_string()),
            ("READY", Some("true")) => ControlEvent::Ready(true),
            ("READY", Some("false")) => ControlEvent::Ready(false),
            ("LEAVE", None) => ControlEvent::Leave,
            ("START", None) => ControlEvent::Start,
            _ => return Err(violation(line)),
        };
        Ok(event)
    }
}

pub fn is_valid_username(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= 32
        && !name.chars().any(|c| c.is_whitespace() || c.is_control())
}

fn violation(line: &str) -> NetError {
    NetError::ProtocolViolation(format!("malformed control line {:?}", line))
}
