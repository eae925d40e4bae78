use jaxnet::HubEvent;

#[derive(Debug, Clone)]
pub enum ServerEvent {
    Hub(HubEvent),
    GameStarted { players: usize, notified: usize },
    GameEnded,
    Error { message: String },
}

impl From<HubEvent> for ServerEvent {
    fn from(event: HubEvent) -> Self {
        ServerEvent::Hub(event)
    }
}

impl ServerEvent {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ServerEvent::Error { .. } | ServerEvent::Hub(HubEvent::JoinRejected { .. })
        )
    }

    pub fn describe(&self) -> String {
        match self {
            ServerEvent::Hub(event) => match event {
                HubEvent::PeerConnected { slot, addr } => {
                    format!("Peer {} connected in slot {}", addr, slot)
                }
                HubEvent::PeerActive { addr, data_addr } => {
                    format!("Peer {} receives datagrams on {}", addr, data_addr)
                }
                HubEvent::PlayerJoined {
                    addr,
                    username,
                    slot,
                } => format!("{} joined from {} (slot {})", username, addr, slot),
                HubEvent::JoinRejected {
                    addr,
                    username,
                    reason,
                } => format!("Rejected {} from {}: {}", username, addr, reason),
                HubEvent::ReadyChanged { username, ready } => {
                    if *ready {
                        format!("{} is ready", username)
                    } else {
                        format!("{} is not ready", username)
                    }
                }
                HubEvent::PlayerLeft { username } => format!("{} left the lobby", username),
                HubEvent::PeerDisconnected { addr, reason } => {
                    format!("Peer {} {}", addr, reason.as_str())
                }
            },
            ServerEvent::GameStarted { players, notified } => format!(
                "Game started with {} players ({} peers notified)",
                players, notified
            ),
            ServerEvent::GameEnded => String::from("All players left, lobby reopened"),
            ServerEvent::Error { message } => message.clone(),
        }
    }
}
