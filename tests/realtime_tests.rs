mod common;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use social_notify::{app, config::Config, start_background_tasks, state::AppState};
use tokio::net::TcpStream;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use common::{create_user, setup_with};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn spawn_server() -> (SocketAddr, Arc<AppState>) {
    spawn_server_with(Config::default()).await
}

async fn spawn_server_with(config: Config) -> (SocketAddr, Arc<AppState>) {
    let (_, state) = setup_with(config).await;
    let server = axum::Server::bind(&"127.0.0.1:0".parse().unwrap())
        .serve(app(state.clone()).into_make_service());
    let addr = server.local_addr();
    tokio::spawn(server);
    (addr, state)
}

async fn next_json(ws: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("message within timeout")
            .expect("stream open")
            .expect("valid frame");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn connect_as(addr: SocketAddr, user_id: &str) -> Client {
    let (mut ws, _) = connect_async(format!("ws://{}/api/ws", addr)).await.unwrap();

    let connect = next_json(&mut ws).await;
    assert_eq!(connect["message_type"], "connect");

    ws.send(Message::Text(
        json!({ "message_type": "join", "data": { "userId": user_id } }).to_string(),
    ))
    .await
    .unwrap();

    let joined = next_json(&mut ws).await;
    assert_eq!(joined["message_type"], "joined");
    assert_eq!(joined["data"]["user_id"], user_id);
    ws
}

#[tokio::test]
async fn test_live_post_notification() {
    let (addr, state) = spawn_server().await;
    let a = create_user(&state, "alice").await;
    let b = create_user(&state, "bob").await;

    let mut alice_ws = connect_as(addr, &a.id).await;

    let client = hyper::Client::new();
    let follow = hyper::Request::post(format!("http://{}/api/users/{}/follow", addr, b.id))
        .header("content-type", "application/json")
        .body(hyper::Body::from(json!({ "followerId": a.id }).to_string()))
        .unwrap();
    assert_eq!(client.request(follow).await.unwrap().status(), 200);

    let post = hyper::Request::post(format!("http://{}/api/posts", addr))
        .header("content-type", "application/json")
        .body(hyper::Body::from(
            json!({ "userId": b.id, "title": "Hello", "content": "World" }).to_string(),
        ))
        .unwrap();
    assert_eq!(client.request(post).await.unwrap().status(), 200);

    let event = next_json(&mut alice_ws).await;
    assert_eq!(event["message_type"], "notification");
    assert_eq!(event["data"]["notification_type"], "POST");
    assert_eq!(event["data"]["recipient_id"], a.id.as_str());
    assert_eq!(event["data"]["message"], "bob created a new post: Hello");
}

#[tokio::test]
async fn test_every_tab_receives_follow_notification() {
    let (addr, state) = spawn_server().await;
    let a = create_user(&state, "alice").await;
    let b = create_user(&state, "bob").await;

    let mut tab1 = connect_as(addr, &b.id).await;
    let mut tab2 = connect_as(addr, &b.id).await;
    assert_eq!(state.registry.online_status(&b.id).active_connections, 2);

    state.fanout_service.on_follow(&a.id, &b.id).await.unwrap();

    for ws in [&mut tab1, &mut tab2] {
        let event = next_json(ws).await;
        assert_eq!(event["message_type"], "notification");
        assert_eq!(event["data"]["notification_type"], "FOLLOW");
        assert_eq!(event["data"]["message"], "alice started following you");
    }
}

#[tokio::test]
async fn test_ping_and_disconnect() {
    let (addr, state) = spawn_server().await;
    let a = create_user(&state, "alice").await;

    let mut ws = connect_as(addr, &a.id).await;
    ws.send(Message::Text(json!({ "message_type": "ping" }).to_string()))
        .await
        .unwrap();
    let pong = next_json(&mut ws).await;
    assert_eq!(pong["message_type"], "pong");

    ws.close(None).await.unwrap();

    // 会话在后台退出并解绑
    let mut offline = false;
    for _ in 0..50 {
        if !state.registry.online_status(&a.id).is_online {
            offline = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(offline);
}

#[tokio::test]
async fn test_stale_sweep_closes_session() {
    let (addr, state) = spawn_server().await;
    let a = create_user(&state, "alice").await;

    let mut ws = connect_as(addr, &a.id).await;
    tokio::time::sleep(Duration::from_millis(30)).await;

    let removed = state
        .websocket_service
        .cleanup_stale_connections(Duration::from_millis(10));
    assert_eq!(removed, 1);
    assert!(!state.registry.online_status(&a.id).is_online);

    // 服务端关闭连接
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}

/// 只监听、不发送任何消息的客户端
fn listen(mut ws: Client) -> tokio::sync::mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        // 持续读取，客户端库在读取时自动回复 Pong
        while let Some(Ok(msg)) = ws.next().await {
            if let Message::Text(text) = msg {
                if let Ok(json) = serde_json::from_str::<Value>(&text) {
                    let _ = tx.send(json);
                }
            }
        }
    });
    rx
}

#[tokio::test]
async fn test_listening_client_survives_stale_sweep() {
    let config = Config {
        ws_ping_interval: 1,
        ws_stale_timeout: 3,
        ws_sweep_interval: 1,
        ..Config::default()
    };
    let (addr, state) = spawn_server_with(config).await;
    start_background_tasks(state.clone());

    let a = create_user(&state, "alice").await;
    let b = create_user(&state, "bob").await;

    let mut events = listen(connect_as(addr, &b.id).await);

    // 超过过期阈值，期间客户端只收不发
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(state.registry.online_status(&b.id).is_online);

    let client = hyper::Client::new();
    let status = client
        .get(format!("http://{}/api/ws/status/{}", addr, b.id).parse().unwrap())
        .await
        .unwrap();
    let body = hyper::body::to_bytes(status.into_body()).await.unwrap();
    let status: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(status["is_online"], true);
    assert_eq!(status["active_connections"], 1);

    state.fanout_service.on_follow(&a.id, &b.id).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("notification within timeout")
        .expect("connection still open");
    assert_eq!(event["message_type"], "notification");
    assert_eq!(event["data"]["notification_type"], "FOLLOW");
}

#[tokio::test]
async fn test_unjoined_connection_is_closed() {
    let config = Config {
        ws_stale_timeout: 1,
        ..Config::default()
    };
    let (addr, _state) = spawn_server_with(config).await;

    let (mut ws, _) = connect_async(format!("ws://{}/api/ws", addr)).await.unwrap();
    let connect = next_json(&mut ws).await;
    assert_eq!(connect["message_type"], "connect");

    // 不发送 join，服务端在期限后关闭连接
    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok());
}
