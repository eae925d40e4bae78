use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, UdpSocket};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use super::codec::{Message, encode_datagram};
use super::connection::ConnectionState;
use super::events::{DisconnectReason, HubEvent};
use super::protocol::{ControlEvent, encode_handshake, read_control_line};
use super::shutdown::Shutdown;
use super::stats::{DatagramStats, NetworkStats};
use super::transport::{recv_frame, send_frame};
use crate::config::NetConfig;
use crate::error::{NetError, NetResult};
use crate::lobby::{JoinOutcome, Lobby, LobbySettings, LobbyState};
use crate::roster::{Roster, Slot};

pub type PeerId = u64;

type ControlWriter = Arc<AsyncMutex<OwnedWriteHalf>>;

#[derive(Debug)]
struct Peer {
    id: PeerId,
    control_addr: SocketAddr,
    data_addr: SocketAddr,
    /// The hub's own data socket as addressed from this peer's side of the connection.
    hub_data_addr: SocketAddr,
    state: ConnectionState,
    username: Option<String>,
    connected_at: Instant,
    writer: ControlWriter,
    reader_task: Option<JoinHandle<()>>,
}

impl Peer {
    fn info(&self, slot: Slot) -> PeerInfo {
        PeerInfo {
            slot,
            id: self.id,
            control_addr: self.control_addr,
            data_addr: self.data_addr,
            state: self.state,
            username: self.username.clone(),
            connected_secs: self.connected_at.elapsed().as_secs(),
        }
    }

    // An unannounced peer on the hub's host defaults onto the hub's own data socket.
    fn accepts_datagrams(&self) -> bool {
        match self.state {
            ConnectionState::Active => true,
            ConnectionState::PortAssigned => self.data_addr != self.hub_data_addr,
            _ => false,
        }
    }

    fn stop_reader(&self) {
        if let Some(task) = &self.reader_task {
            task.abort();
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    pub slot: Slot,
    pub id: PeerId,
    pub control_addr: SocketAddr,
    pub data_addr: SocketAddr,
    pub state: ConnectionState,
    pub username: Option<String>,
    pub connected_secs: u64,
}

#[derive(Debug)]
struct HubState {
    roster: Roster<Peer>,
    lobby: Lobby,
    events: VecDeque<HubEvent>,
    next_peer_id: PeerId,
}

fn lock_state(state: &Mutex<HubState>) -> MutexGuard<'_, HubState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Server side of a session: the control listener, the shared datagram socket and the roster.
pub struct SessionHub {
    config: NetConfig,
    listener: Mutex<Option<Arc<TcpListener>>>,
    listener_closed: Shutdown,
    data_socket: Option<UdpSocket>,
    state: Arc<Mutex<HubState>>,
    stats: DatagramStats,
    shutdown: Shutdown,
}

impl SessionHub {
    pub fn new(config: NetConfig) -> Self {
        let state = HubState {
            roster: Roster::new(config.max_peers),
            lobby: Lobby::new(LobbySettings::from(&config)),
            events: VecDeque::new(),
            next_peer_id: 1,
        };

        Self {
            config,
            listener: Mutex::new(None),
            listener_closed: Shutdown::new(),
            data_socket: None,
            state: Arc::new(Mutex::new(state)),
            stats: DatagramStats::default(),
            shutdown: Shutdown::new(),
        }
    }

    pub async fn bind(config: NetConfig) -> NetResult<Self> {
        let control_port = config.control_port;
        let data_port = config.data_port;

        let mut hub = Self::new(config);
        hub.open_listener(control_port).await?;
        hub.bind_data_channel(data_port).await?;
        Ok(hub)
    }

    pub async fn open_listener(&mut self, port: u16) -> NetResult<SocketAddr> {
        let listener = TcpListener::bind((self.config.bind_address, port))
            .await
            .map_err(|source| NetError::Bind { port, source })?;
        let local_addr = listener.local_addr()?;
        log::info!("Control listener on {}", local_addr);

        *self.listener.get_mut().unwrap_or_else(|e| e.into_inner()) = Some(Arc::new(listener));
        self.listener_closed = Shutdown::new();
        Ok(local_addr)
    }

    /// Stops taking control connections. Pending and later `accept_next` calls fail with
    /// `ListenerClosed`; connected peers are untouched.
    pub fn close_listener(&self) -> bool {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.listener_closed.trigger();
        if listener.is_some() {
            log::info!("Control listener closed");
        }
        listener.is_some()
    }

    pub async fn bind_data_channel(&mut self, port: u16) -> NetResult<SocketAddr> {
        let socket = UdpSocket::bind((self.config.bind_address, port))
            .await
            .map_err(|source| NetError::Bind { port, source })?;
        let local_addr = socket.local_addr()?;
        log::info!("Data channel on {}", local_addr);

        self.data_socket = Some(socket);
        Ok(local_addr)
    }

    pub fn config(&self) -> &NetConfig {
        &self.config
    }

    pub fn local_control_addr(&self) -> Option<SocketAddr> {
        self.listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .and_then(|l| l.local_addr().ok())
    }

    pub fn local_data_addr(&self) -> Option<SocketAddr> {
        self.data_socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn data_port(&self) -> u16 {
        self.local_data_addr()
            .map(|addr| addr.port())
            .unwrap_or(self.config.data_port)
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.trigger();
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats.snapshot()
    }

    pub fn peer_count(&self) -> usize {
        self.lock().roster.len()
    }

    pub fn peers(&self) -> Vec<PeerInfo> {
        self.lock()
            .roster
            .iter()
            .map(|(slot, peer)| peer.info(slot))
            .collect()
    }

    pub fn lobby(&self) -> Lobby {
        self.lock().lobby.clone()
    }

    pub fn with_lobby<R>(&self, f: impl FnOnce(&mut Lobby) -> R) -> R {
        f(&mut self.lock().lobby)
    }

    pub fn drain_events(&self) -> Vec<HubEvent> {
        self.lock().events.drain(..).collect()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        lock_state(&self.state)
    }

    fn data_socket(&self) -> NetResult<&UdpSocket> {
        self.data_socket.as_ref().ok_or(NetError::NotConnected)
    }

    pub async fn accept_next(&self) -> NetResult<PeerInfo> {
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .ok_or(NetError::ListenerClosed)?;
        let (stream, addr) = self
            .shutdown
            .guard(None, async {
                tokio::select! {
                    biased;
                    _ = self.listener_closed.triggered() => Err(NetError::ListenerClosed),
                    accepted = listener.accept() => Ok(accepted?),
                }
            })
            .await?;
        drop(listener);

        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Setting TCP_NODELAY for {}: {}", addr, e);
        }
        let hub_ip = stream.local_addr()?.ip();

        let (read_half, write_half) = stream.into_split();
        let writer: ControlWriter = Arc::new(AsyncMutex::new(write_half));

        let id = {
            let mut state = self.lock();
            let id = state.next_peer_id;
            let peer = Peer {
                id,
                control_addr: addr,
                data_addr: SocketAddr::new(addr.ip(), self.config.client_data_port),
                hub_data_addr: SocketAddr::new(hub_ip, self.data_port()),
                state: ConnectionState::Connecting,
                username: None,
                connected_at: Instant::now(),
                writer: Arc::clone(&writer),
                reader_task: None,
            };
            match state.roster.push(peer) {
                Ok(_) => {
                    state.next_peer_id += 1;
                    id
                }
                Err(_) => {
                    let capacity = state.roster.capacity();
                    log::warn!("Refusing {}: roster full ({} peers)", addr, capacity);
                    return Err(NetError::RosterFull { capacity });
                }
            }
        };

        let handshake = encode_handshake(self.data_port());
        let written = {
            let mut writer = writer.lock().await;
            match writer.write_all(handshake.as_bytes()).await {
                Ok(()) => writer.flush().await,
                Err(e) => Err(e),
            }
        };
        if let Err(e) = written {
            self.lock().roster.remove_where(|p| p.id == id);
            log::warn!("Handshake with {} failed: {}", addr, e);
            return Err(NetError::Io(e));
        }

        // The control task does not exist yet, so only close_all can have removed the peer.
        let info = {
            let mut state = self.lock();
            let HubState { roster, events, .. } = &mut *state;
            let Some(slot) = roster.position(|p| p.id == id) else {
                return Err(self.vanished(addr));
            };
            let Some(peer) = roster.get_mut(slot) else {
                return Err(self.vanished(addr));
            };
            if peer.state == ConnectionState::Connecting {
                peer.state = ConnectionState::PortAssigned;
            }
            events.push_back(HubEvent::PeerConnected { slot, addr });
            peer.info(slot)
        };
        log::info!("Peer {} connected in slot {}", addr, info.slot);

        let task = tokio::spawn(run_control_task(
            id,
            addr,
            read_half,
            Arc::clone(&self.state),
            self.shutdown.clone(),
        ));
        match self.lock().roster.find_mut(|p| p.id == id) {
            Some(peer) => peer.reader_task = Some(task),
            None => task.abort(),
        }

        Ok(info)
    }

    fn vanished(&self, addr: SocketAddr) -> NetError {
        if self.shutdown.is_triggered() {
            NetError::Shutdown
        } else {
            NetError::PeerClosed(addr)
        }
    }

    /// Returns the control addresses of the removed peers.
    pub fn prune_closed(&self) -> Vec<SocketAddr> {
        let mut state = self.lock();
        let HubState {
            roster,
            lobby,
            events,
            ..
        } = &mut *state;

        let removed = roster.remove_where(|p| p.state == ConnectionState::Disconnected);
        for peer in &removed {
            peer.stop_reader();
            for entry in lobby.leave_address(peer.control_addr) {
                events.push_back(HubEvent::PlayerLeft {
                    username: entry.username,
                });
            }
            events.push_back(HubEvent::PeerDisconnected {
                addr: peer.control_addr,
                reason: DisconnectReason::Closed,
            });
            log::info!("Pruned closed peer {}", peer.control_addr);
        }

        removed.iter().map(|p| p.control_addr).collect()
    }

    /// Failed sends are logged and skipped; returns how many datagrams went out.
    pub async fn broadcast(&self, message: &dyn Message) -> NetResult<usize> {
        let socket = self.data_socket()?;
        let frame = encode_datagram(message.bytes(), self.config.packet_length);

        let targets: Vec<SocketAddr> = self
            .lock()
            .roster
            .iter()
            .filter(|(_, p)| p.accepts_datagrams())
            .map(|(_, p)| p.data_addr)
            .collect();

        let mut sent = 0;
        for addr in targets {
            if send_frame(socket, &frame, addr, &self.stats).await.is_ok() {
                sent += 1;
            }
        }
        Ok(sent)
    }

    pub async fn receive_from_any(&self, message: &mut dyn Message) -> NetResult<SocketAddr> {
        let socket = self.data_socket()?;
        let packet_length = self.config.packet_length;
        let mut buf = vec![0u8; packet_length];

        self.shutdown
            .guard(self.config.receive_timeout(), async {
                Ok(recv_frame(socket, &mut buf, packet_length, message, &self.stats).await)
            })
            .await
    }

    pub async fn announce_start(&self) -> usize {
        let writers: Vec<(SocketAddr, ControlWriter)> = {
            let mut state = self.lock();
            state.lobby.set_state(LobbyState::InGame);
            state
                .roster
                .iter()
                .filter(|(_, p)| p.state.is_open())
                .map(|(_, p)| (p.control_addr, Arc::clone(&p.writer)))
                .collect()
        };

        let line = ControlEvent::Start.to_line();
        let mut notified = 0;
        for (addr, writer) in writers {
            let mut writer = writer.lock().await;
            match writer.write_all(line.as_bytes()).await {
                Ok(()) => notified += 1,
                Err(e) => log::warn!("Failed to announce start to {}: {}", addr, e),
            }
        }
        notified
    }

    pub async fn close_all(&self) {
        let peers = {
            let mut state = self.lock();
            let peers = state.roster.drain();
            state.lobby.clear();
            for peer in &peers {
                state.events.push_back(HubEvent::PeerDisconnected {
                    addr: peer.control_addr,
                    reason: DisconnectReason::Shutdown,
                });
            }
            peers
        };

        for peer in peers {
            peer.stop_reader();
            let mut writer = peer.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                log::debug!("Closing {}: {}", peer.control_addr, e);
            }
        }
        log::info!("Closed all peer connections");
    }
}

async fn run_control_task(
    id: PeerId,
    addr: SocketAddr,
    read_half: OwnedReadHalf,
    state: Arc<Mutex<HubState>>,
    shutdown: Shutdown,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        let read = tokio::select! {
            biased;
            _ = shutdown.triggered() => break,
            read = read_control_line(&mut reader, &mut line) => read,
        };

        match read {
            Ok(0) => {
                log::info!("Control connection from {} closed", addr);
                break;
            }
            Ok(_) if !line.ends_with('\n') => {
                log::warn!("Dropping {}: control line too long or cut short", addr);
                break;
            }
            Ok(_) => match line.parse::<ControlEvent>() {
                Ok(event) => apply_control_event(&state, id, addr, event),
                Err(e) => log::warn!("Ignoring control line from {}: {}", addr, e),
            },
            Err(e) => {
                log::warn!("Control connection from {} failed: {}", addr, e);
                break;
            }
        }
    }

    let mut state = lock_state(&state);
    if let Some(peer) = state.roster.find_mut(|p| p.id == id) {
        peer.state = ConnectionState::Disconnected;
    }
}

fn apply_control_event(state: &Mutex<HubState>, id: PeerId, addr: SocketAddr, event: ControlEvent) {
    log::debug!("{} -> {}", addr, event);

    let mut state = lock_state(state);
    let HubState {
        roster,
        lobby,
        events,
        ..
    } = &mut *state;
    let Some(peer) = roster.find_mut(|p| p.id == id) else {
        return;
    };

    match event {
        ControlEvent::Port(port) => {
            peer.data_addr = SocketAddr::new(addr.ip(), port);
            peer.state = ConnectionState::Active;
            events.push_back(HubEvent::PeerActive {
                addr,
                data_addr: peer.data_addr,
            });
        }
        ControlEvent::Join(username) => {
            if peer.username.as_deref() == Some(username.as_str()) {
                return;
            }
            if let Some(previous) = peer.username.take() {
                lobby.leave_username(&previous);
                events.push_back(HubEvent::PlayerLeft { username: previous });
            }
            match lobby.join(addr, &username) {
                Ok(JoinOutcome::Joined(slot)) => {
                    log::info!("{} joined the lobby as {} (slot {})", addr, username, slot);
                    peer.username = Some(username.clone());
                    events.push_back(HubEvent::PlayerJoined {
                        addr,
                        username,
                        slot,
                    });
                }
                Ok(JoinOutcome::AlreadyPresent(_)) => {
                    log::debug!("{} asked for taken username {}", addr, username);
                }
                Err(e) => {
                    events.push_back(HubEvent::JoinRejected {
                        addr,
                        username,
                        reason: e.to_string(),
                    });
                }
            }
        }
        ControlEvent::Ready(ready) => {
            if let Some(username) = &peer.username {
                if lobby.set_ready(username, ready) {
                    events.push_back(HubEvent::ReadyChanged {
                        username: username.clone(),
                        ready,
                    });
                }
            }
        }
        ControlEvent::Leave => {
            if let Some(username) = peer.username.take() {
                lobby.leave_username(&username);
                events.push_back(HubEvent::PlayerLeft { username });
            }
        }
        ControlEvent::Start => {
            log::warn!("Ignoring START sent by peer {}", addr);
        }
    }
}
