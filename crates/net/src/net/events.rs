use std::net::SocketAddr;

use crate::roster::Slot;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    PeerConnected {
        slot: Slot,
        addr: SocketAddr,
    },
    PeerActive {
        addr: SocketAddr,
        data_addr: SocketAddr,
    },
    PlayerJoined {
        addr: SocketAddr,
        username: String,
        slot: Slot,
    },
    JoinRejected {
        addr: SocketAddr,
        username: String,
        reason: String,
    },
    ReadyChanged {
        username: String,
        ready: bool,
    },
    PlayerLeft {
        username: String,
    },
    PeerDisconnected {
        addr: SocketAddr,
        reason: DisconnectReason,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    Closed,
    Shutdown,
}

impl DisconnectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisconnectReason::Closed => "closed the connection",
            DisconnectReason::Shutdown => "was disconnected by the server",
        }
    }
}
