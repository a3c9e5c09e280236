//! `StreamingClient` against a loopback WebSocket server.

#![allow(unused_results)]

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{WebSocketStream, accept_async, accept_hdr_async};

use orderwire_core::protocol::MISSING_TOKEN_REASON;
use orderwire_core::{Credential, CredentialStore, RelayError};
use orderwire_stream::{ConnectionState, StreamConfig, StreamingClient};

const TIMEOUT: Duration = Duration::from_secs(5);

const SENTINEL: &str =
    r#"{"user-id":"U1","status-code":"200","order-status":"AB00","error-message":""}"#;

// ─────────────────────────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────────────────────────

type Peer = WebSocketStream<TcpStream>;

struct TestServer {
    url: String,
    accepted: Arc<AtomicUsize>,
    uris: mpsc::UnboundedReceiver<String>,
}

/// Server running `behaviour(index, socket)` for every accepted connection.
async fn spawn_server<F, Fut>(behaviour: F) -> TestServer
where
    F: Fn(usize, Peer) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let count = accepted.clone();
    let (uri_tx, uri_rx) = mpsc::unbounded_channel();
    let behaviour = Arc::new(behaviour);

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = count.fetch_add(1, Ordering::SeqCst);
            let uri_tx = uri_tx.clone();
            let behaviour = behaviour.clone();
            tokio::spawn(async move {
                let callback =
                    move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        let _ = uri_tx.send(req.uri().to_string());
                        Ok(resp)
                    };
                if let Ok(ws) = accept_hdr_async(stream, callback).await {
                    behaviour(index, ws).await;
                }
            });
        }
    });

    TestServer {
        url: format!("ws://{addr}/api/order/websocket"),
        accepted,
        uris: uri_rx,
    }
}

/// Read until the peer goes away.
async fn hold_open(mut ws: Peer) {
    while let Some(Ok(msg)) = ws.next().await {
        if matches!(msg, Message::Close(_)) {
            break;
        }
    }
}

fn fast_config(url: &str) -> StreamConfig {
    StreamConfig {
        ping_interval: Duration::from_secs(30),
        reconnect_delay: Duration::from_millis(50),
        max_reconnect_attempts: 5,
        close_timeout: Duration::from_millis(200),
        ..StreamConfig::new(url)
    }
}

fn logged_in(token: &str) -> CredentialStore {
    CredentialStore::with_credential(Credential::new(token))
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(TIMEOUT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

type Log<T> = Arc<Mutex<Vec<T>>>;

fn record<T: Clone + Send + 'static>() -> (Log<T>, impl Fn(&T) + Send + Sync + 'static) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (log, move |value: &T| sink.lock().push(value.clone()))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

// ── delivery ──

#[tokio::test]
async fn delivers_updates_in_order_and_consumes_sentinel() {
    let server = spawn_server(|_, mut ws| async move {
        ws.send(Message::text(SENTINEL)).await.unwrap();
        ws.send(Message::text(r#"{"order-status":"AB05","orderData":{"orderid":"1"}}"#))
            .await
            .unwrap();
        ws.send(Message::text("pong")).await.unwrap();
        ws.send(Message::text("not json")).await.unwrap();
        ws.send(Message::text(r#"{"order-status":"AB06"}"#)).await.unwrap();
        hold_open(ws).await;
    })
    .await;

    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));
    let (first, first_cb) = record::<String>();
    let (second, second_cb) = record::<String>();
    let _a = client.on_status(move |m| first_cb(&m.order_status.clone().unwrap_or_default()));
    let _b = client.on_status(move |m| second_cb(&m.order_status.clone().unwrap_or_default()));

    client.connect();
    wait_until(|| second.lock().len() == 2).await;

    assert_eq!(*first.lock(), vec!["AB05", "AB06"]);
    assert_eq!(*second.lock(), vec!["AB05", "AB06"]);
    assert!(client.is_connected());
}

#[tokio::test]
async fn token_sent_as_encoded_query_parameter() {
    let mut server = spawn_server(|_, ws| hold_open(ws)).await;
    let client = StreamingClient::new(fast_config(&server.url), logged_in("a+b/c"));

    client.connect();
    let uri = tokio::time::timeout(TIMEOUT, server.uris.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(uri, "/api/order/websocket?token=a%2Bb%2Fc");
}

#[tokio::test]
async fn unsubscribed_callback_not_invoked() {
    let (go_tx, go_rx) = mpsc::unbounded_channel::<()>();
    let go_rx = Arc::new(tokio::sync::Mutex::new(go_rx));
    let server = spawn_server(move |_, mut ws| {
        let go_rx = go_rx.clone();
        async move {
            let _ = go_rx.lock().await.recv().await;
            ws.send(Message::text(r#"{"order-status":"AB05"}"#)).await.unwrap();
            hold_open(ws).await;
        }
    })
    .await;

    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));
    let (kept, kept_cb) = record::<String>();
    let (dropped, dropped_cb) = record::<String>();
    let _kept = client.on_status(move |m| kept_cb(&m.order_status.clone().unwrap_or_default()));
    let gone = client.on_status(move |m| dropped_cb(&m.order_status.clone().unwrap_or_default()));

    client.connect();
    wait_until(|| client.is_connected()).await;
    assert!(gone.unsubscribe());
    go_tx.send(()).unwrap();

    wait_until(|| kept.lock().len() == 1).await;
    assert!(dropped.lock().is_empty());
}

// ── connect ──

#[tokio::test]
async fn missing_token_reports_unauthorized() {
    let server = spawn_server(|_, ws| hold_open(ws)).await;
    let client = StreamingClient::new(fast_config(&server.url), CredentialStore::new());
    let (errors, on_error) = record::<RelayError>();
    let _sub = client.on_error(on_error);

    client.connect();

    assert!(matches!(
        errors.lock().as_slice(),
        [RelayError::Unauthorized { .. }]
    ));
    assert_eq!(client.state(), ConnectionState::Idle);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn connect_while_open_is_noop() {
    let server = spawn_server(|_, ws| hold_open(ws)).await;
    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));

    client.connect();
    client.connect();
    wait_until(|| client.is_connected()).await;
    client.connect();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
}

// ── keepalive ──

#[tokio::test]
async fn pings_while_open() {
    let (ping_tx, mut ping_rx) = mpsc::unbounded_channel::<String>();
    let server = spawn_server(move |_, mut ws| {
        let ping_tx = ping_tx.clone();
        async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Text(t) = msg {
                    let _ = ping_tx.send(t.to_string());
                    let _ = ws.send(Message::text("pong")).await;
                }
            }
        }
    })
    .await;

    let config = StreamConfig {
        ping_interval: Duration::from_millis(50),
        ..fast_config(&server.url)
    };
    let client = StreamingClient::new(config, logged_in("tok-1"));
    client.connect();

    for _ in 0..2 {
        let text = tokio::time::timeout(TIMEOUT, ping_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(text, "ping");
    }
}

// ── reconnect ──

#[tokio::test]
async fn reconnects_after_server_drop() {
    let server = spawn_server(|index, mut ws| async move {
        if index == 0 {
            let _ = ws.close(None).await;
        } else {
            hold_open(ws).await;
        }
    })
    .await;

    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));
    let (changes, on_change) = record::<bool>();
    let _sub = client.on_connection(move |c| on_change(&c));

    client.connect();
    wait_until(|| changes.lock().len() == 3).await;

    assert_eq!(*changes.lock(), vec![true, false, true]);
    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);
    assert_eq!(client.reconnect_attempts(), 0);
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let dead = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}/api/order/websocket", dead.local_addr().unwrap());
    drop(dead);

    let config = StreamConfig {
        reconnect_delay: Duration::from_millis(10),
        max_reconnect_attempts: 2,
        ..fast_config(&url)
    };
    let client = StreamingClient::new(config, logged_in("tok-1"));
    let (errors, on_error) = record::<RelayError>();
    let _sub = client.on_error(on_error);

    client.connect();
    wait_until(|| !errors.lock().is_empty()).await;

    assert_eq!(
        *errors.lock(),
        vec![RelayError::MaxReconnectExceeded { attempts: 2 }]
    );
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn five_consecutive_failures_then_gives_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let accepted = Arc::new(AtomicUsize::new(0));
    let count = accepted.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = count.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(async move {
                // First session opens, then drops without a close frame.
                // Every later handshake is cut before the upgrade.
                if index == 0 {
                    if let Ok(ws) = accept_async(stream).await {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        drop(ws);
                    }
                } else {
                    drop(stream);
                }
            });
        }
    });

    let delay = Duration::from_millis(40);
    let config = StreamConfig {
        reconnect_delay: delay,
        max_reconnect_attempts: 5,
        ..fast_config(&format!("ws://{addr}/api/order/websocket"))
    };
    let client = StreamingClient::new(config, logged_in("tok-1"));
    let (errors, on_error) = record::<RelayError>();
    let _errors = client.on_error(on_error);
    let (changes, on_change) = record::<bool>();
    let _changes = client.on_connection(move |c| on_change(&c));

    client.connect();
    wait_until(|| client.is_connected()).await;
    let opened = tokio::time::Instant::now();
    wait_until(|| !errors.lock().is_empty()).await;

    assert!(opened.elapsed() >= delay * 5);
    assert_eq!(
        *errors.lock(),
        vec![RelayError::MaxReconnectExceeded { attempts: 5 }]
    );
    assert_eq!(*changes.lock(), vec![true, false]);
    assert_eq!(accepted.load(Ordering::SeqCst), 6);
    assert_eq!(client.state(), ConnectionState::Idle);

    tokio::time::sleep(delay * 4).await;
    assert_eq!(accepted.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn missing_token_close_stops_without_reconnect() {
    let server = spawn_server(|_, mut ws| async move {
        let _ = ws
            .close(Some(CloseFrame {
                code: CloseCode::Policy,
                reason: MISSING_TOKEN_REASON.into(),
            }))
            .await;
    })
    .await;

    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));
    let (errors, on_error) = record::<RelayError>();
    let _sub = client.on_error(on_error);

    client.connect();
    wait_until(|| !errors.lock().is_empty()).await;

    assert_eq!(
        *errors.lock(),
        vec![RelayError::UpgradeRejected {
            reason: MISSING_TOKEN_REASON.into()
        }]
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn other_policy_close_reconnects() {
    let server = spawn_server(|index, mut ws| async move {
        if index == 0 {
            let _ = ws
                .close(Some(CloseFrame {
                    code: CloseCode::Policy,
                    reason: "session expired".into(),
                }))
                .await;
        } else {
            hold_open(ws).await;
        }
    })
    .await;

    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));
    let (errors, on_error) = record::<RelayError>();
    let _errors = client.on_error(on_error);
    let (changes, on_change) = record::<bool>();
    let _changes = client.on_connection(move |c| on_change(&c));

    client.connect();
    wait_until(|| changes.lock().len() == 3).await;

    assert_eq!(*changes.lock(), vec![true, false, true]);
    assert!(errors.lock().is_empty());
    assert_eq!(server.accepted.load(Ordering::SeqCst), 2);
}

// ── disconnect ──

#[tokio::test]
async fn disconnect_during_reconnect_cancels_timer() {
    let server = spawn_server(|_, mut ws| async move {
        let _ = ws.close(None).await;
    })
    .await;

    let config = StreamConfig {
        reconnect_delay: Duration::from_millis(200),
        ..fast_config(&server.url)
    };
    let client = StreamingClient::new(config, logged_in("tok-1"));

    client.connect();
    wait_until(|| client.state() == ConnectionState::Reconnecting).await;
    client.disconnect();
    assert_eq!(client.state(), ConnectionState::Idle);

    let before = server.accepted.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), before);
    assert_eq!(client.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn disconnect_while_open_sends_normal_close() {
    let (code_tx, mut code_rx) = mpsc::unbounded_channel::<Option<u16>>();
    let server = spawn_server(move |_, mut ws| {
        let code_tx = code_tx.clone();
        async move {
            while let Some(Ok(msg)) = ws.next().await {
                if let Message::Close(frame) = msg {
                    let _ = code_tx.send(frame.map(|f| u16::from(f.code)));
                    break;
                }
            }
        }
    })
    .await;

    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));
    let (changes, on_change) = record::<bool>();
    let _sub = client.on_connection(move |c| on_change(&c));

    client.connect();
    wait_until(|| client.is_connected()).await;
    client.disconnect();
    assert!(!client.is_connected());

    let code = tokio::time::timeout(TIMEOUT, code_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, Some(1000));

    wait_until(|| client.state() == ConnectionState::Idle).await;
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(*changes.lock(), vec![true, false]);
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn dropping_client_closes_socket() {
    let (closed_tx, mut closed_rx) = mpsc::unbounded_channel::<()>();
    let server = spawn_server(move |_, ws| {
        let closed_tx = closed_tx.clone();
        async move {
            hold_open(ws).await;
            let _ = closed_tx.send(());
        }
    })
    .await;

    let client = StreamingClient::new(fast_config(&server.url), logged_in("tok-1"));
    client.connect();
    wait_until(|| client.is_connected()).await;
    drop(client);

    tokio::time::timeout(TIMEOUT, closed_rx.recv())
        .await
        .unwrap()
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.accepted.load(Ordering::SeqCst), 1);
}
