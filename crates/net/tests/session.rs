use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use jaxnet::{
    ConnectionEndpoint, ConnectionState, ControlEvent, HubEvent, MAX_CONTROL_LINE, Message,
    NetConfig, NetError, PeerInfo, RawMessage, SessionHub,
};

static PORT_COUNTER: AtomicU16 = AtomicU16::new(42000);

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(10, Ordering::SeqCst)
}

fn config(control_port: u16, data_port: u16) -> NetConfig {
    NetConfig {
        bind_address: LOCALHOST,
        control_port,
        data_port,
        receive_timeout_ms: Some(2000),
        connect_timeout_ms: 2000,
        ..Default::default()
    }
}

async fn start_hub(config: NetConfig) -> Arc<SessionHub> {
    Arc::new(SessionHub::bind(config).await.unwrap())
}

fn spawn_accept(hub: &Arc<SessionHub>) -> tokio::task::JoinHandle<Result<PeerInfo, NetError>> {
    let hub = Arc::clone(hub);
    tokio::spawn(async move { hub.accept_next().await })
}

/// Connects a client whose data channel is bound to `data_port` before the handshake.
async fn connect_client(hub: &Arc<SessionHub>, config: &NetConfig, data_port: u16) -> ConnectionEndpoint {
    let accept = spawn_accept(hub);
    let mut client = ConnectionEndpoint::new(config.clone());
    client.bind_data_channel(data_port).await.unwrap();
    client.connect(LOCALHOST, config.control_port).await.unwrap();
    accept.await.unwrap().unwrap();
    client
}

async fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..400 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn default_port_scenario() {
    let config = config(53001, 50333);
    let hub = start_hub(config.clone()).await;

    let accept = spawn_accept(&hub);
    let mut client = ConnectionEndpoint::new(config.clone());
    let port = client.connect(LOCALHOST, 53001).await.unwrap();
    assert_eq!(port, 50333);
    assert_eq!(client.state(), ConnectionState::PortAssigned);

    let peer = accept.await.unwrap().unwrap();
    assert_eq!(peer.slot, 1);

    let sent = client.send(&RawMessage::new(vec![0, 1, 2, 3])).await.unwrap();
    assert_eq!(sent, 1024);

    let mut received = RawMessage::default();
    hub.receive_from_any(&mut received).await.unwrap();
    assert_eq!(received.len(), 1024);
    assert_eq!(&received.bytes()[..4], &[0, 1, 2, 3]);
    assert!(received.bytes()[4..].iter().all(|&b| b == 0));
}

#[tokio::test]
async fn client_uses_advertised_data_port() {
    let control = next_port();
    let data = control + 1;
    let hub = start_hub(config(control, data)).await;

    let accept = spawn_accept(&hub);
    let mut client = ConnectionEndpoint::new(config(control, 50333));
    let port = client.connect(LOCALHOST, control).await.unwrap();
    accept.await.unwrap().unwrap();

    assert_eq!(port, data);
    assert_eq!(client.server_data_port(), data);

    client.send(&RawMessage::new(b"hello".to_vec())).await.unwrap();
    let mut received = RawMessage::default();
    hub.receive_from_any(&mut received).await.unwrap();
    assert_eq!(&received.bytes()[..5], b"hello");
}

#[tokio::test]
async fn broadcast_sends_one_datagram_per_peer() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let mut clients = Vec::new();
    for i in 0..3 {
        clients.push(connect_client(&hub, &config, control + 2 + i).await);
    }

    assert!(
        wait_until(|| hub
            .peers()
            .iter()
            .all(|p| p.state == ConnectionState::Active))
        .await
    );

    let sent = hub.broadcast(&RawMessage::new(vec![9, 8, 7])).await.unwrap();
    assert_eq!(sent, 3);
    assert_eq!(hub.stats().packets_sent, 3);

    for client in &clients {
        let mut received = RawMessage::default();
        client.receive(&mut received).await.unwrap();
        assert_eq!(received.len(), config.packet_length);
        assert_eq!(&received.bytes()[..3], &[9, 8, 7]);
    }
}

#[tokio::test]
async fn receive_task_runs_beside_sender() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let mut client = connect_client(&hub, &config, control + 2).await;
    let channel = client.data_channel().unwrap();
    assert_eq!(channel.remote_addr(), Some(SocketAddr::new(LOCALHOST, control + 1)));
    assert_eq!(channel.packet_length(), config.packet_length);
    let receiver = tokio::spawn(async move {
        let mut message = RawMessage::default();
        channel.receive(&mut message).await.map(|_| message)
    });

    assert!(
        wait_until(|| hub.peers()[0].state == ConnectionState::Active).await
    );
    hub.broadcast(&RawMessage::new(vec![42])).await.unwrap();

    let message = receiver.await.unwrap().unwrap();
    assert_eq!(message.bytes()[0], 42);

    client.send(&RawMessage::new(vec![43])).await.unwrap();
    let mut inbound = RawMessage::default();
    hub.receive_from_any(&mut inbound).await.unwrap();
    assert_eq!(inbound.bytes()[0], 43);
}

#[tokio::test]
async fn prune_compacts_slots_in_order() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let first = connect_client(&hub, &config, control + 2).await;
    let mut second = connect_client(&hub, &config, control + 3).await;
    let third = connect_client(&hub, &config, control + 4).await;
    assert_eq!(hub.peer_count(), 3);

    second.disconnect().await.unwrap();

    let mut removed = Vec::new();
    assert!(
        wait_until(|| {
            removed.extend(hub.prune_closed());
            !removed.is_empty()
        })
        .await
    );
    assert_eq!(removed.len(), 1);

    let peers = hub.peers();
    let layout: Vec<_> = peers.iter().map(|p| (p.slot, p.data_addr.port())).collect();
    assert_eq!(layout, vec![(1, control + 2), (2, control + 4)]);

    drop(first);
    drop(third);
}

#[tokio::test]
async fn lobby_events_travel_over_control_channel() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let mut ada = connect_client(&hub, &config, control + 2).await;
    let mut bob = connect_client(&hub, &config, control + 3).await;
    let mut impostor = connect_client(&hub, &config, control + 4).await;

    ada.join("ada").await.unwrap();
    assert!(wait_until(|| hub.lobby().player_count() == 1).await);
    bob.join("bob").await.unwrap();
    assert!(wait_until(|| hub.lobby().player_count() == 2).await);

    impostor.join("ada").await.unwrap();
    ada.set_ready(true).await.unwrap();
    assert!(wait_until(|| hub.lobby().entry("ada").is_some_and(|e| e.ready)).await);
    assert!(!hub.lobby().all_ready());
    assert_eq!(hub.lobby().player_count(), 2);

    bob.set_ready(true).await.unwrap();
    assert!(wait_until(|| hub.lobby().all_ready()).await);

    let joined: Vec<_> = hub
        .drain_events()
        .into_iter()
        .filter_map(|e| match e {
            HubEvent::PlayerJoined { username, slot, .. } => Some((slot, username)),
            _ => None,
        })
        .collect();
    assert_eq!(joined, vec![(1, String::from("ada")), (2, String::from("bob"))]);

    assert_eq!(hub.announce_start().await, 3);
    assert_eq!(ada.next_control_event().await.unwrap(), ControlEvent::Start);
    assert_eq!(bob.next_control_event().await.unwrap(), ControlEvent::Start);
}

#[tokio::test]
async fn closed_connection_frees_lobby_seat() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let mut ada = connect_client(&hub, &config, control + 2).await;
    let mut bob = connect_client(&hub, &config, control + 3).await;
    ada.join("ada").await.unwrap();
    bob.join("bob").await.unwrap();
    assert!(wait_until(|| hub.lobby().player_count() == 2).await);

    ada.disconnect().await.unwrap();
    assert!(
        wait_until(|| {
            hub.prune_closed();
            hub.peer_count() == 1
        })
        .await
    );

    let lobby = hub.lobby();
    assert_eq!(lobby.player_count(), 1);
    assert_eq!(lobby.slot_of("bob"), Some(1));
    assert!(
        hub.drain_events()
            .contains(&HubEvent::PlayerLeft {
                username: String::from("ada")
            })
    );

    bob.leave().await.unwrap();
    assert!(wait_until(|| hub.lobby().is_empty()).await);
    assert_eq!(hub.peer_count(), 1);
}

#[tokio::test]
async fn close_all_empties_roster() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let mut ada = connect_client(&hub, &config, control + 2).await;
    let _bob = connect_client(&hub, &config, control + 3).await;
    ada.join("ada").await.unwrap();
    assert!(wait_until(|| hub.lobby().player_count() == 1).await);

    hub.close_all().await;
    assert_eq!(hub.peer_count(), 0);
    assert!(hub.lobby().is_empty());

    assert!(matches!(
        ada.next_control_event().await,
        Err(NetError::NotConnected)
    ));
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut client = ConnectionEndpoint::new(config(port, 50333));
    let err = client.connect(LOCALHOST, port).await.unwrap_err();
    assert!(matches!(err, NetError::Connect { .. }), "{:?}", err);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn malformed_handshake_is_rejected() {
    let listener = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        stream.write_all(b"not-a-port\n").await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let mut client = ConnectionEndpoint::new(config(port, 50333));
    let err = client.connect(LOCALHOST, port).await.unwrap_err();
    assert!(matches!(err, NetError::ProtocolViolation(_)), "{:?}", err);

    let err = client.connect(LOCALHOST, port).await.unwrap_err();
    assert!(matches!(err, NetError::ProtocolViolation(_)), "{:?}", err);

    server.await.unwrap();
}

#[tokio::test]
async fn occupied_ports_fail_to_bind() {
    let control = next_port();
    let config = config(control, control + 1);
    let _hub = start_hub(config.clone()).await;

    let mut second = SessionHub::new(config.clone());
    assert!(matches!(
        second.open_listener(control).await,
        Err(NetError::Bind { port, .. }) if port == control
    ));
    assert!(matches!(
        second.bind_data_channel(control + 1).await,
        Err(NetError::Bind { .. })
    ));

    let mut client = ConnectionEndpoint::new(config);
    assert!(matches!(
        client.bind_data_channel(control + 1).await,
        Err(NetError::Bind { .. })
    ));
}

#[tokio::test]
async fn shutdown_wakes_blocked_hub_tasks() {
    let control = next_port();
    let mut config = config(control, control + 1);
    config.receive_timeout_ms = None;
    let hub = start_hub(config).await;

    let receiver = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            let mut message = RawMessage::default();
            hub.receive_from_any(&mut message).await
        })
    };
    let acceptor = spawn_accept(&hub);

    tokio::time::sleep(Duration::from_millis(20)).await;
    hub.shutdown();

    assert!(matches!(receiver.await.unwrap(), Err(NetError::Shutdown)));
    assert!(matches!(acceptor.await.unwrap(), Err(NetError::Shutdown)));
}

#[tokio::test]
async fn client_receive_times_out() {
    let port = next_port();
    let mut config = config(port, port + 1);
    config.receive_timeout_ms = Some(30);

    let mut client = ConnectionEndpoint::new(config);
    client.bind_data_channel(port + 2).await.unwrap();

    let mut message = RawMessage::default();
    assert!(matches!(
        client.receive(&mut message).await,
        Err(NetError::Timeout)
    ));
}

#[tokio::test]
async fn endpoint_is_dead_after_disconnect() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let mut client = connect_client(&hub, &config, control + 2).await;
    client.disconnect().await.unwrap();

    assert!(client.is_closed());
    assert!(matches!(
        client.send(&RawMessage::new(vec![1])).await,
        Err(NetError::EndpointClosed)
    ));
    assert!(matches!(
        client.connect(LOCALHOST, control).await,
        Err(NetError::EndpointClosed)
    ));
    assert!(matches!(client.disconnect().await, Err(NetError::EndpointClosed)));
}

#[tokio::test]
async fn send_before_connect_is_rejected() {
    let mut client = ConnectionEndpoint::new(NetConfig::default());
    let err = client.send(&RawMessage::new(vec![1])).await.unwrap_err();
    assert!(matches!(err, NetError::NotConnected));
    assert_eq!(client.server_addr(), None);
}

#[tokio::test]
async fn unannounced_peer_on_hub_host_is_not_sent_datagrams() {
    let control = next_port();
    let mut config = config(control, control + 1);
    config.client_data_port = control + 1;
    config.receive_timeout_ms = Some(100);
    let hub = start_hub(config.clone()).await;

    let accept = spawn_accept(&hub);
    let mut client = ConnectionEndpoint::new(config.clone());
    client.connect(LOCALHOST, control).await.unwrap();
    let peer = accept.await.unwrap().unwrap();
    assert_eq!(Some(peer.data_addr), hub.local_data_addr());

    let state = RawMessage::new(vec![0xAB, 0xCD]);
    assert_eq!(hub.broadcast(&state).await.unwrap(), 0);
    let mut echoed = RawMessage::default();
    assert!(matches!(
        hub.receive_from_any(&mut echoed).await,
        Err(NetError::Timeout)
    ));

    client.bind_data_channel(control + 2).await.unwrap();
    assert!(wait_until(|| hub.peers()[0].state == ConnectionState::Active).await);
    assert_eq!(hub.broadcast(&state).await.unwrap(), 1);

    let mut received = RawMessage::default();
    client.receive(&mut received).await.unwrap();
    assert_eq!(&received.bytes()[..2], &[0xAB, 0xCD]);
}

#[tokio::test]
async fn peers_hanging_up_at_once_never_look_like_shutdown() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let pruner = {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move {
            loop {
                hub.prune_closed();
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
    };

    for _ in 0..20 {
        let accept = spawn_accept(&hub);
        drop(TcpStream::connect((LOCALHOST, control)).await.unwrap());
        let result = accept.await.unwrap();
        assert!(
            !matches!(result, Err(NetError::Shutdown | NetError::ListenerClosed)),
            "{:?}",
            result
        );
    }
    pruner.abort();

    let _client = connect_client(&hub, &config, control + 2).await;
    assert!(hub.peers().iter().any(|p| p.data_addr.port() == control + 2));
}

#[tokio::test]
async fn closed_listener_refuses_new_peers() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;
    let _seated = connect_client(&hub, &config, control + 2).await;

    let pending = spawn_accept(&hub);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(hub.close_listener());
    assert!(matches!(
        pending.await.unwrap(),
        Err(NetError::ListenerClosed)
    ));
    assert!(matches!(hub.accept_next().await, Err(NetError::ListenerClosed)));
    assert_eq!(hub.local_control_addr(), None);
    assert!(!hub.close_listener());

    let mut late = ConnectionEndpoint::new(config);
    assert!(matches!(
        late.connect(LOCALHOST, control).await,
        Err(NetError::Connect { .. })
    ));

    assert_eq!(hub.peer_count(), 1);
    assert!(wait_until(|| hub.peers()[0].state == ConnectionState::Active).await);
    assert_eq!(hub.broadcast(&RawMessage::new(vec![1])).await.unwrap(), 1);
}

#[tokio::test]
async fn full_roster_turns_peers_away() {
    let control = next_port();
    let mut config = config(control, control + 1);
    config.max_peers = 1;
    let hub = start_hub(config.clone()).await;
    let _seated = connect_client(&hub, &config, control + 2).await;

    let accept = spawn_accept(&hub);
    let mut extra = TcpStream::connect((LOCALHOST, control)).await.unwrap();
    assert!(matches!(
        accept.await.unwrap(),
        Err(NetError::RosterFull { capacity: 1 })
    ));
    assert_eq!(hub.peer_count(), 1);

    let mut buf = [0u8; 8];
    assert_eq!(extra.read(&mut buf).await.unwrap(), 0);
}

#[tokio::test]
async fn full_lobby_rejects_fifth_player() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config.clone()).await;

    let names = ["ada", "bob", "cy", "dee", "eve"];
    let mut clients = Vec::new();
    for (i, name) in names.iter().enumerate() {
        let mut client = connect_client(&hub, &config, control + 2 + i as u16).await;
        client.join(name).await.unwrap();
        if i < 4 {
            assert!(wait_until(|| hub.lobby().player_count() == i + 1).await);
        }
        clients.push(client);
    }

    let mut rejected = Vec::new();
    assert!(
        wait_until(|| {
            rejected.extend(
                hub.drain_events()
                    .into_iter()
                    .filter(|e| matches!(e, HubEvent::JoinRejected { .. })),
            );
            !rejected.is_empty()
        })
        .await
    );

    match &rejected[0] {
        HubEvent::JoinRejected { username, .. } => assert_eq!(username, "eve"),
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(hub.lobby().player_count(), 4);
    assert_eq!(hub.lobby().slot_of("eve"), None);
    assert_eq!(hub.peer_count(), 5);
}

#[tokio::test]
async fn overlong_control_line_drops_peer() {
    let control = next_port();
    let config = config(control, control + 1);
    let hub = start_hub(config).await;

    let accept = spawn_accept(&hub);
    let mut raw = TcpStream::connect((LOCALHOST, control)).await.unwrap();
    accept.await.unwrap().unwrap();

    let mut handshake = [0u8; 16];
    let read = raw.read(&mut handshake).await.unwrap();
    assert!(handshake[..read].ends_with(b"\n"));

    raw.write_all(&vec![b'A'; MAX_CONTROL_LINE + 44]).await.unwrap();

    let mut removed = Vec::new();
    assert!(
        wait_until(|| {
            removed.extend(hub.prune_closed());
            !removed.is_empty()
        })
        .await
    );
    assert_eq!(hub.peer_count(), 0);
}
