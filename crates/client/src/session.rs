use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use jaxnet::{
    ConnectionEndpoint, ControlEvent, DataChannel, Message, NetError, NetResult, RawMessage,
};

/// Payload sent every tick: the tick counter, big-endian.
pub fn encode_tick(tick: u64) -> RawMessage {
    RawMessage::new(tick.to_be_bytes().to_vec())
}

/// Reads a tick counter back out of a received frame.
pub fn decode_tick(message: &dyn Message) -> Option<u64> {
    let bytes: [u8; 8] = message.bytes().get(..8)?.try_into().ok()?;
    Some(u64::from_be_bytes(bytes))
}

/// Waits until the hub announces the game start, skipping anything else it sends.
pub async fn wait_for_start(endpoint: &mut ConnectionEndpoint) -> NetResult<()> {
    loop {
        match endpoint.next_control_event().await? {
            ControlEvent::Start => return Ok(()),
            other => log::debug!("Ignoring {} while waiting for start", other),
        }
    }
}

pub fn spawn_receiver(channel: DataChannel) -> JoinHandle<u64> {
    tokio::spawn(async move {
        let mut message = RawMessage::default();
        let mut received = 0;
        loop {
            match channel.receive(&mut message).await {
                Ok(from) => {
                    received += 1;
                    match decode_tick(&message) {
                        Some(tick) => log::info!("State from {}: tick {}", from, tick),
                        None => log::info!("State from {}: {} bytes", from, message.len()),
                    }
                }
                Err(NetError::Timeout) => {}
                Err(NetError::Shutdown) => break,
                Err(e) => {
                    log::warn!("Receive failed: {}", e);
                    break;
                }
            }
        }
        received
    })
}

/// Sends the tick counter once per `tick` until a send fails.
pub async fn send_ticks(endpoint: &mut ConnectionEndpoint, tick: Duration) -> NetResult<()> {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut counter = 0u64;
    loop {
        interval.tick().await;
        endpoint.send(&encode_tick(counter)).await?;
        counter += 1;
    }
}
