//! Two real WebSocket clients playing through the server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use roshambo::network::directory::RoomDirectory;
use roshambo::network::protocol::{ErrorCode, ServerMessage};
use roshambo::{GameServer, Move, ParticipantId, ServerConfig};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct Harness {
    server: Arc<GameServer>,
    ws_addr: SocketAddr,
    room_id: String,
    alice: String,
    bob: String,
}

async fn start() -> Harness {
    start_with(ServerConfig::default()).await
}

async fn start_with(config: ServerConfig) -> Harness {
    let ws_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_addr = ws_listener.local_addr().unwrap();

    let server = Arc::new(GameServer::new(config));
    let state = server.http_state();
    let alice = state.identity.login("Alice").await.unwrap();
    let bob = state.identity.login("Bob").await.unwrap();
    let room = state.directory.create_room(alice.clone(), None).await;
    state.directory.join_room(&room.room_id, bob.clone()).await.unwrap();
    assert_eq!(state.directory.roster(&room.room_id).await.unwrap().players.len(), 2);

    let serving = server.clone();
    tokio::spawn(async move { serving.serve(ws_listener, http_listener).await });

    Harness {
        server,
        ws_addr,
        room_id: room.room_id,
        alice: alice.as_str().to_string(),
        bob: bob.as_str().to_string(),
    }
}

async fn connect(h: &Harness, user: &str) -> Client {
    let url = format!("ws://{}/ws/{}/{}", h.ws_addr, h.room_id, user);
    let (ws, _) = connect_async(url).await.unwrap();
    ws
}

async fn next_message(ws: &mut Client) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = frame {
            return ServerMessage::from_json(&text).unwrap();
        }
    }
}

async fn send(ws: &mut Client, json: &str) {
    ws.send(Message::Text(json.to_string())).await.unwrap();
}

#[tokio::test]
async fn test_full_round_over_websocket() {
    let h = start().await;

    let mut alice = connect(&h, &h.alice).await;
    assert!(matches!(next_message(&mut alice).await, ServerMessage::Connected { .. }));
    let mut bob = connect(&h, &h.bob).await;
    assert!(matches!(next_message(&mut bob).await, ServerMessage::Connected { .. }));

    send(&mut alice, r#"{"type":"submit_move","move":"Rock"}"#).await;
    for ws in [&mut alice, &mut bob] {
        assert!(matches!(next_message(ws).await, ServerMessage::MoveReceived { moves_count: 1 }));
    }

    send(&mut bob, r#"{"type":"submit_move","move":"scissors"}"#).await;
    for ws in [&mut alice, &mut bob] {
        assert!(matches!(next_message(ws).await, ServerMessage::MoveReceived { moves_count: 2 }));
        match next_message(ws).await {
            ServerMessage::Result(report) => {
                assert_eq!(report.winner, "Alice");
                assert_eq!(report.moves.get("Alice"), Some(&Move::Rock));
                assert_eq!(report.moves.get("Bob"), Some(&Move::Scissors));
            }
            other => panic!("expected result, got {:?}", other),
        }
    }

    // Too early: the round is still awaiting acknowledgment.
    send(&mut alice, r#"{"type":"submit_move","move":"paper"}"#).await;
    match next_message(&mut alice).await {
        ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::SessionBusy),
        other => panic!("expected error, got {:?}", other),
    }

    send(&mut alice, r#"{"type":"acknowledge_next_round"}"#).await;
    send(&mut bob, r#"{"type":"ready_for_next_round"}"#).await;
    for ws in [&mut alice, &mut bob] {
        assert!(matches!(next_message(ws).await, ServerMessage::Reset));
    }

    send(&mut bob, r#"{"type":"query_status"}"#).await;
    match next_message(&mut bob).await {
        ServerMessage::Status { room_status } => {
            assert_eq!(room_status.moves_count, 0);
            assert_eq!(room_status.round, 2);
        }
        other => panic!("expected status, got {:?}", other),
    }

    h.server.shutdown("test over").await;
    for ws in [&mut alice, &mut bob] {
        assert!(matches!(next_message(ws).await, ServerMessage::Shutdown { .. }));
    }
}

#[tokio::test]
async fn test_outsider_is_rejected() {
    let h = start().await;

    let mut outsider = connect(&h, "not-a-member").await;
    match next_message(&mut outsider).await {
        ServerMessage::Error(e) => assert_eq!(e.code, ErrorCode::NotAuthorized),
        other => panic!("expected error, got {:?}", other),
    }
    let frame = tokio::time::timeout(Duration::from_secs(5), outsider.next())
        .await
        .unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | Some(Err(_)) | None));
    assert_eq!(h.server.connection_count().await, 0);
}

#[tokio::test]
async fn test_disconnect_notifies_peer() {
    let h = start().await;

    let mut alice = connect(&h, &h.alice).await;
    next_message(&mut alice).await;
    let mut bob = connect(&h, &h.bob).await;
    next_message(&mut bob).await;

    send(&mut alice, r#"{"type":"submit_move","move":"paper"}"#).await;
    next_message(&mut alice).await;
    next_message(&mut bob).await;

    alice.close(None).await.unwrap();
    match next_message(&mut bob).await {
        ServerMessage::PeerDisconnected { name } => assert_eq!(name, "Alice"),
        other => panic!("expected peer_disconnected, got {:?}", other),
    }

    // Leaving does not forfeit the recorded move.
    send(&mut bob, r#"{"type":"query_status"}"#).await;
    match next_message(&mut bob).await {
        ServerMessage::Status { room_status } => assert_eq!(room_status.moves_count, 1),
        other => panic!("expected status, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_side_close_ends_the_socket() {
    let h = start().await;

    let mut alice = connect(&h, &h.alice).await;
    next_message(&mut alice).await;
    let mut bob = connect(&h, &h.bob).await;
    next_message(&mut bob).await;

    // What the dispatcher does when Alice's queue overflows.
    let handle = h
        .server
        .coordinator()
        .registry()
        .get(&h.room_id, &ParticipantId::new(h.alice.as_str()))
        .await
        .unwrap();
    handle.close();

    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), alice.next())
            .await
            .expect("socket stayed open after close");
        match frame {
            Some(Ok(Message::Text(_))) => continue,
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
            Some(Ok(other)) => panic!("unexpected frame {:?}", other),
        }
    }

    match next_message(&mut bob).await {
        ServerMessage::PeerDisconnected { name } => assert_eq!(name, "Alice"),
        other => panic!("expected peer_disconnected, got {:?}", other),
    }
    assert_eq!(h.server.connection_count().await, 1);
}

#[tokio::test]
async fn test_silent_socket_is_dropped_after_handshake_timeout() {
    let config = ServerConfig {
        connection_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    };
    let h = start_with(config).await;

    let mut silent = TcpStream::connect(h.ws_addr).await.unwrap();
    let mut buf = [0u8; 64];
    let read = tokio::time::timeout(Duration::from_secs(3), silent.read(&mut buf))
        .await
        .expect("server kept a silent socket open");
    assert!(matches!(read, Ok(0) | Err(_)));

    // The slot is released once the connection task exits.
    for _ in 0..50 {
        if h.server.socket_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(h.server.socket_count(), 0);

    // The listener still serves real clients.
    let mut alice = connect(&h, &h.alice).await;
    assert!(matches!(next_message(&mut alice).await, ServerMessage::Connected { .. }));
}
