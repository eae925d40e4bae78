use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use jaxnet::{
    CommandBuffer, CommandProcessor, LobbyState, NetError, NetResult, NetworkStats, PeerInfo,
    PendingCommand, RawMessage, RosterEntry, SessionHub,
};

use crate::config::ServerConfig;
use crate::events::ServerEvent;
use crate::simulation::RelayProcessor;

#[derive(Debug, Clone)]
pub struct ServerStats {
    pub tick: u64,
    pub uptime_secs: u64,
    pub max_peers: usize,
    pub lobby_capacity: usize,
    pub lobby_state: LobbyState,
    pub peers: Vec<PeerInfo>,
    pub players: Vec<RosterEntry>,
    pub dropped_commands: u64,
    pub network_stats: NetworkStats,
}

pub struct GameServer {
    hub: Arc<SessionHub>,
    config: ServerConfig,
    commands: CommandBuffer,
    inbound: mpsc::Receiver<PendingCommand>,
    processor: RelayProcessor,
    tick: u64,
    tick_duration: Duration,
    running: Arc<AtomicBool>,
    start_time: Instant,
    pending_events: VecDeque<ServerEvent>,
    tasks: Vec<JoinHandle<()>>,
}

impl GameServer {
    /// Binds both ports and spawns the accept and datagram-receive tasks on the current runtime.
    pub async fn start(config: ServerConfig) -> NetResult<Self> {
        let hub = Arc::new(SessionHub::bind(config.net.clone()).await?);
        let (tx, inbound) = mpsc::channel(config.inbound_queue_size);

        let tasks = vec![
            tokio::spawn(accept_loop(Arc::clone(&hub))),
            tokio::spawn(receive_loop(Arc::clone(&hub), tx)),
        ];

        Ok(Self {
            commands: CommandBuffer::new(config.command_buffer_size),
            tick_duration: config.net.tick_duration(),
            hub,
            config,
            inbound,
            processor: RelayProcessor::new(),
            tick: 0,
            running: Arc::new(AtomicBool::new(true)),
            start_time: Instant::now(),
            pending_events: VecDeque::new(),
            tasks,
        })
    }

    pub fn local_control_addr(&self) -> Option<SocketAddr> {
        self.hub.local_control_addr()
    }

    pub fn local_data_addr(&self) -> Option<SocketAddr> {
        self.hub.local_data_addr()
    }

    pub fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn drain_events(&mut self) -> impl Iterator<Item = ServerEvent> + '_ {
        self.pending_events.drain(..)
    }

    /// Headless loop: ticks at the configured rate until stopped or interrupted.
    pub async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.tick_duration);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick().await;
                    for event in self.pending_events.drain(..) {
                        if event.is_warning() {
                            log::warn!("{}", event.describe());
                        } else {
                            log::info!("{}", event.describe());
                        }
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Interrupted");
                    self.running.store(false, Ordering::SeqCst);
                }
            }
        }

        self.shutdown().await;
    }

    pub async fn tick(&mut self) {
        self.tick += 1;

        self.hub.prune_closed();
        self.pending_events
            .extend(self.hub.drain_events().into_iter().map(ServerEvent::from));

        self.update_lobby().await;

        while let Ok(pending) = self.inbound.try_recv() {
            self.commands.push(pending.sender, pending.message);
        }

        if self.hub.lobby().state() != LobbyState::InGame {
            self.commands.clear();
            return;
        }

        self.commands.apply(&mut self.processor);
        let state: RawMessage = self.processor.result();
        if state.is_empty() {
            return;
        }
        if let Err(e) = self.hub.broadcast(&state).await {
            self.pending_events.push_back(ServerEvent::Error {
                message: format!("Broadcast failed: {}", e),
            });
        }
    }

    async fn update_lobby(&mut self) {
        let lobby = self.hub.lobby();
        match lobby.state() {
            LobbyState::Waiting if lobby.all_ready() => {
                let notified = self.hub.announce_start().await;
                self.processor.reset();
                self.pending_events.push_back(ServerEvent::GameStarted {
                    players: lobby.player_count(),
                    notified,
                });
            }
            LobbyState::InGame if lobby.is_empty() => {
                self.hub.with_lobby(|lobby| lobby.set_state(LobbyState::Waiting));
                self.processor.reset();
                self.pending_events.push_back(ServerEvent::GameEnded);
            }
            _ => {}
        }
    }

    pub fn stats(&self) -> ServerStats {
        let lobby = self.hub.lobby();
        ServerStats {
            tick: self.tick,
            uptime_secs: self.start_time.elapsed().as_secs(),
            max_peers: self.config.net.max_peers,
            lobby_capacity: lobby.settings().capacity,
            lobby_state: lobby.state(),
            peers: self.hub.peers(),
            players: lobby.entries(),
            dropped_commands: self.commands.dropped(),
            network_stats: self.hub.stats(),
        }
    }

    /// Stops the background tasks and closes every peer connection.
    pub async fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.hub.close_listener();
        self.hub.shutdown();
        self.hub.close_all().await;

        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                log::debug!("Server task ended abnormally: {}", e);
            }
        }
        log::info!("Server shut down");
    }
}

async fn accept_loop(hub: Arc<SessionHub>) {
    loop {
        match hub.accept_next().await {
            Ok(peer) => log::debug!("Accepted {} as peer {}", peer.control_addr, peer.id),
            Err(NetError::Shutdown | NetError::ListenerClosed) => break,
            Err(NetError::RosterFull { .. }) => {}
            Err(e @ NetError::PeerClosed(_)) => log::debug!("{}", e),
            Err(e) => log::warn!("Accept failed: {}", e),
        }
    }
}

async fn receive_loop(hub: Arc<SessionHub>, tx: mpsc::Sender<PendingCommand>) {
    let mut message = RawMessage::default();
    loop {
        match hub.receive_from_any(&mut message).await {
            Ok(sender) => {
                let pending = PendingCommand {
                    sender,
                    message: message.clone(),
                };
                if tx.send(pending).await.is_err() {
                    break;
                }
            }
            Err(NetError::Timeout) => {}
            Err(NetError::Shutdown) => break,
            Err(e) => {
                log::warn!("Datagram receive failed: {}", e);
                break;
            }
        }
    }
}
