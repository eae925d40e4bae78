use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use super::codec::{Message, decode_datagram, encode_datagram};
use super::shutdown::Shutdown;
use super::stats::DatagramStats;
use crate::error::{NetError, NetResult};

pub(crate) async fn send_frame(
    socket: &UdpSocket,
    frame: &[u8],
    addr: SocketAddr,
    stats: &DatagramStats,
) -> NetResult<usize> {
    match socket.send_to(frame, addr).await {
        Ok(bytes) => {
            stats.record_sent(bytes);
            Ok(bytes)
        }
        Err(source) => {
            stats.record_send_failure();
            let err = NetError::Send { addr, source };
            log::warn!("Dropping datagram: {}", err);
            Err(err)
        }
    }
}

// Receive failures are logged and skipped.
pub(crate) async fn recv_frame(
    socket: &UdpSocket,
    buf: &mut [u8],
    packet_length: usize,
    message: &mut dyn Message,
    stats: &DatagramStats,
) -> SocketAddr {
    loop {
        match socket.recv_from(buf).await {
            Ok((size, addr)) => {
                stats.record_received(size);
                decode_datagram(&buf[..size], packet_length, message);
                return addr;
            }
            Err(e) => {
                stats.record_receive_failure();
                log::warn!("Dropping datagram: {}", NetError::Receive(e));
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct DataChannel {
    socket: Arc<UdpSocket>,
    remote: Option<SocketAddr>,
    packet_length: usize,
    receive_timeout: Option<Duration>,
    stats: Arc<DatagramStats>,
    shutdown: Shutdown,
}

impl DataChannel {
    pub(crate) fn new(
        socket: Arc<UdpSocket>,
        remote: Option<SocketAddr>,
        packet_length: usize,
        receive_timeout: Option<Duration>,
        stats: Arc<DatagramStats>,
        shutdown: Shutdown,
    ) -> Self {
        Self {
            socket,
            remote,
            packet_length,
            receive_timeout,
            stats,
            shutdown,
        }
    }

    pub fn local_addr(&self) -> NetResult<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote
    }

    pub fn packet_length(&self) -> usize {
        self.packet_length
    }

    pub async fn send(&self, message: &dyn Message) -> NetResult<usize> {
        let addr = self.remote.ok_or(NetError::NotConnected)?;
        let frame = encode_datagram(message.bytes(), self.packet_length);
        send_frame(&self.socket, &frame, addr, &self.stats).await
    }

    pub async fn receive(&self, message: &mut dyn Message) -> NetResult<SocketAddr> {
        let mut buf = vec![0u8; self.packet_length];
        self.shutdown
            .guard(self.receive_timeout, async {
                Ok(recv_frame(&self.socket, &mut buf, self.packet_length, message, &self.stats).await)
            })
            .await
    }
}
