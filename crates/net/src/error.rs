use std::io;
use std::net::SocketAddr;

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("failed to connect to {addr}: {source}")]
    Connect { addr: SocketAddr, source: io::Error },
    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },
    #[error("failed to send datagram to {addr}: {source}")]
    Send { addr: SocketAddr, source: io::Error },
    #[error("failed to receive datagram: {0}")]
    Receive(io::Error),
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    #[error("endpoint is closed")]
    EndpointClosed,
    #[error("endpoint is not connected")]
    NotConnected,
    #[error("peer {0} went away during the handshake")]
    PeerClosed(SocketAddr),
    #[error("control listener is closed")]
    ListenerClosed,
    #[error("roster is full ({capacity} peers)")]
    RosterFull { capacity: usize },
    #[error("shutdown requested")]
    Shutdown,
    #[error("timed out")]
    Timeout,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl NetError {
    pub fn connect_timed_out(addr: SocketAddr) -> Self {
        NetError::Connect {
            addr,
            source: io::Error::new(io::ErrorKind::TimedOut, "connection timed out"),
        }
    }
}

pub type NetResult<T> = Result<T, NetError>;
