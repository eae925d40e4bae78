use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, UdpSocket};

use super::codec::Message;
use super::connection::ConnectionState;
use super::protocol::{ControlEvent, is_valid_username, parse_handshake, read_control_line};
use super::shutdown::Shutdown;
use super::stats::{DatagramStats, NetworkStats};
use super::transport::DataChannel;
use crate::config::NetConfig;
use crate::error::{NetError, NetResult};

struct ControlChannel {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

/// Client side of a session. Dead for good once `disconnect` has run.
pub struct ConnectionEndpoint {
    config: NetConfig,
    state: ConnectionState,
    closed: bool,
    server_addr: Option<SocketAddr>,
    server_data_port: u16,
    control: Option<ControlChannel>,
    data_socket: Option<Arc<UdpSocket>>,
    stats: Arc<DatagramStats>,
    shutdown: Shutdown,
    line: String,
}

impl ConnectionEndpoint {
    pub fn new(config: NetConfig) -> Self {
        Self {
            server_data_port: config.data_port,
            config,
            state: ConnectionState::Disconnected,
            closed: false,
            server_addr: None,
            control: None,
            data_socket: None,
            stats: Arc::new(DatagramStats::default()),
            shutdown: Shutdown::new(),
            line: String::new(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn server_addr(&self) -> Option<SocketAddr> {
        self.server_addr
    }

    pub fn server_data_port(&self) -> u16 {
        self.server_data_port
    }

    pub fn local_data_addr(&self) -> Option<SocketAddr> {
        self.data_socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    pub fn stats(&self) -> NetworkStats {
        self.stats.snapshot()
    }

    pub fn shutdown_signal(&self) -> Shutdown {
        self.shutdown.clone()
    }

    fn ensure_open(&self) -> NetResult<()> {
        if self.closed {
            Err(NetError::EndpointClosed)
        } else {
            Ok(())
        }
    }

    /// Returns the data port the hub expects datagrams on.
    pub async fn connect(&mut self, server: IpAddr, control_port: u16) -> NetResult<u16> {
        self.ensure_open()?;
        if self.control.is_some() {
            return Err(NetError::ProtocolViolation(String::from("already connected")));
        }

        let addr = SocketAddr::new(server, control_port);
        log::info!("Connecting to {}", addr);
        self.state = ConnectionState::Connecting;

        match self.open_control(addr).await {
            Ok(port) => Ok(port),
            Err(e) => {
                self.state = ConnectionState::Disconnected;
                self.control = None;
                Err(e)
            }
        }
    }

    async fn open_control(&mut self, addr: SocketAddr) -> NetResult<u16> {
        let timeout = self.config.connect_timeout();

        let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(NetError::Connect { addr, source }),
            Err(_) => return Err(NetError::connect_timed_out(addr)),
        };
        if let Err(e) = stream.set_nodelay(true) {
            log::debug!("Setting TCP_NODELAY for {}: {}", addr, e);
        }

        let (read_half, writer) = stream.into_split();
        let mut reader = BufReader::new(read_half);

        let read = tokio::time::timeout(timeout, read_control_line(&mut reader, &mut self.line))
            .await
            .map_err(|_| {
                NetError::ProtocolViolation(String::from("no handshake line from server"))
            })?;
        read?;

        let port = parse_handshake(&self.line)?.unwrap_or(self.config.data_port);
        log::debug!("Server expects datagrams on port {}", port);

        self.server_addr = Some(addr);
        self.server_data_port = port;
        self.control = Some(ControlChannel { reader, writer });
        self.state = ConnectionState::PortAssigned;

        if self.data_socket.is_some() {
            self.announce_data_port().await?;
        }
        Ok(port)
    }

    pub async fn bind_data_channel(&mut self, port: u16) -> NetResult<SocketAddr> {
        self.ensure_open()?;

        let socket = UdpSocket::bind((self.config.bind_address, port))
            .await
            .map_err(|source| NetError::Bind { port, source })?;
        let local_addr = socket.local_addr()?;
        log::info!("Listening for datagrams on {}", local_addr);
        self.data_socket = Some(Arc::new(socket));

        if self.control.is_some() {
            self.announce_data_port().await?;
        }
        Ok(local_addr)
    }

    async fn announce_data_port(&mut self) -> NetResult<()> {
        let Some(port) = self.local_data_addr().map(|a| a.port()) else {
            return Ok(());
        };
        self.write_control(ControlEvent::Port(port)).await?;
        self.state = ConnectionState::Active;
        Ok(())
    }

    pub fn data_channel(&self) -> NetResult<DataChannel> {
        self.ensure_open()?;
        let socket = self.data_socket.as_ref().ok_or(NetError::NotConnected)?;
        let remote = self
            .server_addr
            .map(|addr| SocketAddr::new(addr.ip(), self.server_data_port));

        Ok(DataChannel::new(
            Arc::clone(socket),
            remote,
            self.config.packet_length,
            self.config.receive_timeout(),
            Arc::clone(&self.stats),
            self.shutdown.clone(),
        ))
    }

    pub async fn send(&mut self, message: &dyn Message) -> NetResult<usize> {
        self.ensure_open()?;
        if self.server_addr.is_none() {
            return Err(NetError::NotConnected);
        }
        if self.data_socket.is_none() {
            self.bind_data_channel(0).await?;
        }
        self.data_channel()?.send(message).await
    }

    pub async fn receive(&self, message: &mut dyn Message) -> NetResult<SocketAddr> {
        self.data_channel()?.receive(message).await
    }

    pub async fn join(&mut self, username: &str) -> NetResult<()> {
        if !is_valid_username(username) {
            return Err(NetError::ProtocolViolation(format!(
                "invalid username {:?}",
                username
            )));
        }
        self.write_control(ControlEvent::Join(username.to_string()))
            .await
    }

    pub async fn set_ready(&mut self, ready: bool) -> NetResult<()> {
        self.write_control(ControlEvent::Ready(ready)).await
    }

    pub async fn leave(&mut self) -> NetResult<()> {
        self.write_control(ControlEvent::Leave).await
    }

    async fn write_control(&mut self, event: ControlEvent) -> NetResult<()> {
        self.ensure_open()?;
        let control = self.control.as_mut().ok_or(NetError::NotConnected)?;
        log::debug!("-> {}", event);

        control.writer.write_all(event.to_line().as_bytes()).await?;
        control.writer.flush().await?;
        Ok(())
    }

    pub async fn next_control_event(&mut self) -> NetResult<ControlEvent> {
        self.ensure_open()?;
        let control = self.control.as_mut().ok_or(NetError::NotConnected)?;
        let line = &mut self.line;

        let read = self
            .shutdown
            .guard(None, async {
                Ok(read_control_line(&mut control.reader, line).await?)
            })
            .await?;

        if read == 0 {
            log::info!("Server closed the control connection");
            self.state = ConnectionState::Disconnected;
            self.control = None;
            return Err(NetError::NotConnected);
        }
        self.line.parse()
    }

    pub async fn disconnect(&mut self) -> NetResult<()> {
        self.ensure_open()?;
        self.closed = true;
        self.state = ConnectionState::Disconnected;
        self.shutdown.trigger();

        if let Some(mut control) = self.control.take() {
            if let Err(e) = control.writer.shutdown().await {
                log::debug!("Closing control connection: {}", e);
            }
        }
        self.data_socket = None;
        log::info!("Disconnected");
        Ok(())
    }
}
