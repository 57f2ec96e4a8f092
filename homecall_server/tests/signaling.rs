//! End-to-end tests against a running relay
//!
//! Each test starts the server on an ephemeral port and drives it with real
//! WebSocket clients.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use homecall_server::{ServerConfig, ServerHandle, ServerState, start};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const HOME_JOIN: &str = r#"{"type":"join","payload":{"role":"home"}}"#;
const REMOTE_JOIN: &str = r#"{"type":"join","payload":{"role":"remote"}}"#;
const HOME_ONLINE: &str = r#"{"type":"status","payload":{"homeOnline":true}}"#;
const HOME_OFFLINE: &str = r#"{"type":"status","payload":{"homeOnline":false}}"#;

async fn start_server(config: ServerConfig) -> ServerHandle {
    start(ServerConfig {
        listen: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..config
    })
    .await
    .unwrap()
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

async fn send(client: &mut Client, text: &str) {
    client.send(Message::text(text.to_owned())).await.unwrap();
}

/// Next text frame, skipping control frames
async fn recv(client: &mut Client) -> String {
    let next = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Text(text))) => return text.as_str().to_owned(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("unexpected frame: {other:?}"),
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(3), next)
        .await
        .expect("timed out waiting for a frame")
}

async fn expect_silence(client: &mut Client) {
    let next = async {
        loop {
            match client.next().await {
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => return other,
            }
        }
    };
    if let Ok(frame) = tokio::time::timeout(Duration::from_millis(200), next).await {
        panic!("expected no frame, got {frame:?}");
    }
}

async fn wait_until(registry: &ServerState, condition: impl Fn(&ServerState) -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while !condition(registry) {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

async fn join_home(server: &ServerHandle) -> Client {
    let mut home = connect(server.addr()).await;
    send(&mut home, HOME_JOIN).await;
    wait_until(server.registry(), ServerState::is_home_online).await;
    home
}

#[tokio::test(flavor = "multi_thread")]
async fn call_is_brokered_end_to_end() {
    let server = start_server(ServerConfig::default()).await;
    let mut home = join_home(&server).await;

    let mut remote = connect(server.addr()).await;
    send(&mut remote, REMOTE_JOIN).await;
    assert_eq!(recv(&mut remote).await, HOME_ONLINE);

    send(&mut remote, r#"{"type":"offer","payload":{"sdp":"X"}}"#).await;
    assert_eq!(recv(&mut home).await, r#"{"type":"offer","payload":{"sdp":"X"}}"#);

    send(&mut home, r#"{"type":"answer","payload":{"sdp":"Y"}}"#).await;
    assert_eq!(recv(&mut remote).await, r#"{"type":"answer","payload":{"sdp":"Y"}}"#);

    home.close(None).await.unwrap();
    assert_eq!(recv(&mut remote).await, HOME_OFFLINE);
    assert!(!server.registry().is_home_online());
}

#[tokio::test(flavor = "multi_thread")]
async fn waiting_remote_learns_when_home_arrives() {
    let server = start_server(ServerConfig::default()).await;

    let mut remote = connect(server.addr()).await;
    send(&mut remote, REMOTE_JOIN).await;
    assert_eq!(recv(&mut remote).await, HOME_OFFLINE);

    send(&mut remote, r#"{"type":"offer","payload":{"sdp":"X"}}"#).await;
    assert_eq!(
        recv(&mut remote).await,
        r#"{"type":"error","payload":{"message":"home offline"}}"#
    );

    let _home = join_home(&server).await;
    assert_eq!(recv(&mut remote).await, HOME_ONLINE);
    expect_silence(&mut remote).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn offer_payload_arrives_unchanged() {
    let server = start_server(ServerConfig::default()).await;
    let mut home = join_home(&server).await;
    let mut remote = connect(server.addr()).await;
    send(&mut remote, REMOTE_JOIN).await;
    recv(&mut remote).await;

    let offer = r#"{"type": "offer", "payload": {"sdp": {"type": "offer", "sdp": "v=0..."}}}"#;
    send(&mut remote, offer).await;
    assert_eq!(recv(&mut home).await, offer);
}

#[tokio::test(flavor = "multi_thread")]
async fn newer_home_takes_over() {
    let server = start_server(ServerConfig::default()).await;
    let mut first = join_home(&server).await;

    let mut second = connect(server.addr()).await;
    send(&mut second, HOME_JOIN).await;
    assert_eq!(
        recv(&mut first).await,
        r#"{"type":"error","payload":{"message":"home role taken over by another connection"}}"#
    );

    let mut remote = connect(server.addr()).await;
    send(&mut remote, REMOTE_JOIN).await;
    assert_eq!(recv(&mut remote).await, HOME_ONLINE);

    send(&mut remote, r#"{"type":"candidate","payload":{"candidate":"r"}}"#).await;
    assert_eq!(
        recv(&mut second).await,
        r#"{"type":"candidate","payload":{"candidate":"r"}}"#
    );

    first.close(None).await.unwrap();
    expect_silence(&mut remote).await;
    assert!(server.registry().is_home_online());
}

#[tokio::test(flavor = "multi_thread")]
async fn bad_frames_do_not_close_the_connection() {
    let server = start_server(ServerConfig::default()).await;
    let mut client = connect(server.addr()).await;

    send(&mut client, "definitely not json").await;
    client.send(Message::binary(vec![1u8, 2, 3])).await.unwrap();
    expect_silence(&mut client).await;

    send(&mut client, r#"{"type":"answer","payload":{"sdp":"Y"}}"#).await;
    assert_eq!(
        recv(&mut client).await,
        r#"{"type":"error","payload":{"message":"join before sending answer"}}"#
    );

    send(&mut client, REMOTE_JOIN).await;
    assert_eq!(recv(&mut client).await, HOME_OFFLINE);
    assert_eq!(server.registry().remote_count(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_home_is_evicted_by_heartbeat() {
    let server = start_server(ServerConfig {
        heartbeat_interval: Duration::from_millis(50),
        heartbeat_timeout: Duration::from_millis(300),
        ..ServerConfig::default()
    })
    .await;

    // Never read from home again, so its pongs are never sent
    let _home = join_home(&server).await;

    let mut remote = connect(server.addr()).await;
    send(&mut remote, REMOTE_JOIN).await;
    assert_eq!(recv(&mut remote).await, HOME_ONLINE);
    assert_eq!(recv(&mut remote).await, HOME_OFFLINE);
    assert!(!server.registry().is_home_online());
}

#[tokio::test(flavor = "multi_thread")]
async fn health_endpoint_reports_ok() {
    let server = start_server(ServerConfig::default()).await;

    let mut stream = TcpStream::connect(server.addr()).await.unwrap();
    stream
        .write_all(b"GET /api/health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.ends_with(r#"{"status":"ok"}"#), "{response}");
}
