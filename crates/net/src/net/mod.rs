mod codec;
mod connection;
mod endpoint;
mod events;
mod hub;
mod protocol;
mod shutdown;
mod stats;
mod transport;

pub use codec::{Message, RawMessage, decode_datagram, encode_datagram};
pub use connection::ConnectionState;
pub use endpoint::ConnectionEndpoint;
pub use events::{DisconnectReason, HubEvent};
pub use hub::{PeerId, PeerInfo, SessionHub};
pub use protocol::{
    ControlEvent, DEFAULT_CONTROL_PORT, DEFAULT_DATA_PORT, DEFAULT_PACKET_LENGTH,
    MAX_CONTROL_LINE, MAX_PACKET_LENGTH, encode_handshake, is_valid_username, parse_handshake,
    read_control_line,
};
pub use shutdown::Shutdown;
pub use stats::{DatagramStats, NetworkStats};
pub use transport::DataChannel;
