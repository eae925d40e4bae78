pub mod config;
pub mod error;
pub mod lobby;
pub mod net;
pub mod roster;
pub mod simulation;

pub use config::{ConfigError, NetConfig};
pub use error::{NetError, NetResult};
pub use lobby::{JoinOutcome, Lobby, LobbyError, LobbySettings, LobbyState, RosterEntry};
pub use net::{
    ConnectionEndpoint, ConnectionState, ControlEvent, DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT,
    DEFAULT_PACKET_LENGTH, DataChannel, DisconnectReason, HubEvent, MAX_CONTROL_LINE,
    MAX_PACKET_LENGTH, Message, NetworkStats, PeerInfo, RawMessage, SessionHub, Shutdown,
};
pub use roster::{Roster, Slot};
pub use simulation::{CommandBuffer, CommandProcessor, PendingCommand};
