//! Group chat scenarios driven through the client proxy.

use std::sync::Arc;
use std::time::Duration;

use arbor_chat::{ChatRoom, User, build_server};
use arbor_client::{Client, ClientError, LocalTransport, params};
use arbor_server::{RpcServer, ServerConfig};
use assert_matches::assert_matches;
use serde_json::Value;
use tokio::sync::mpsc;

type Server = Arc<RpcServer<ChatRoom>>;

fn server() -> Server {
    Arc::new(build_server(ServerConfig::default()).unwrap())
}

fn local_client(server: &Server) -> Client {
    Client::with_transport(LocalTransport::new(Arc::clone(server)))
}

/// Connect and collect every event named `event` under `chat`.
fn listen(client: &Client, event: &str) -> mpsc::UnboundedReceiver<Value> {
    let (tx, rx) = mpsc::unbounded_channel();
    client
        .path("chat")
        .on(event, move |data| {
            let _ = tx.send(data);
        })
        .unwrap();
    rx
}

async fn recv(rx: &mut mpsc::UnboundedReceiver<Value>) -> Value {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event not delivered")
        .expect("listener dropped")
}

/// Let in-flight frames drain before asserting that nothing else arrived.
async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
}

async fn join(client: &Client, name: &str) -> User {
    client
        .path("chat")
        .path("join")
        .call_as(params![name])
        .await
        .unwrap()
}

// ── Routing ─────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_module_is_routing_error() {
    let server = server();
    let client = local_client(&server);
    let err = client.path("lobby").path("join").call(params!["ada"]).await.unwrap_err();
    assert_eq!(err.reason(), Some("ROUTING"));
}

#[tokio::test]
async fn join_without_channel_is_rejected() {
    let server = server();
    let client = local_client(&server);
    let err = client.path("chat").path("join").call(params!["ada"]).await.unwrap_err();
    assert_eq!(err.reason(), Some("NO_REALTIME_CONNECTION"));
}

// ── Membership ──────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_name_is_taken() {
    let server = server();
    let a = local_client(&server);
    let b = local_client(&server);
    let _ = a.connect().await.unwrap();
    let _ = b.connect().await.unwrap();

    let _ = join(&a, "ada").await;
    let err = b.path("chat").path("join").call(params!["ada"]).await.unwrap_err();
    assert_eq!(err.reason(), Some("NAME_TAKEN"));

    let users: Vec<User> = a.path("chat").path("list_clients").call_as(params![]).await.unwrap();
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].username, "ada");
}

#[tokio::test]
async fn join_announces_client_added() {
    let server = server();
    let a = local_client(&server);
    let b = local_client(&server);
    let _ = a.connect().await.unwrap();
    let _ = b.connect().await.unwrap();
    let mut added_a = listen(&a, "client_added");

    let _ = join(&a, "ada").await;
    assert_eq!(recv(&mut added_a).await["username"], "ada");

    let _ = join(&b, "grace").await;
    assert_eq!(recv(&mut added_a).await["username"], "grace");
}

#[tokio::test]
async fn disconnect_removes_member_once() {
    let server = server();
    let a = local_client(&server);
    let b = local_client(&server);
    let _ = a.connect().await.unwrap();
    let b_id = b.connect().await.unwrap();
    let mut removed = listen(&a, "client_removed");

    let _ = join(&a, "ada").await;
    let _ = join(&b, "grace").await;

    b.disconnect().unwrap();

    let gone = recv(&mut removed).await;
    assert_eq!(gone["username"], "grace");
    assert!(server.registry().lookup(&b_id).is_none());

    settle().await;
    assert!(removed.try_recv().is_err(), "client_removed sent more than once");

    let users: Vec<User> = a.path("chat").path("list_clients").call_as(params![]).await.unwrap();
    assert_eq!(users.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(), ["ada"]);
}

// ── Messages ────────────────────────────────────────────────────────

#[tokio::test]
async fn message_reaches_each_member_once() {
    const MEMBERS: usize = 4;
    let server = server();

    let mut members = Vec::new();
    for n in 0..MEMBERS {
        let client = local_client(&server);
        let _ = client.connect().await.unwrap();
        let rx = listen(&client, "user_message");
        join(&client, &format!("user-{n}")).await;
        members.push((client, rx));
    }

    let outsider = local_client(&server);
    let _ = outsider.connect().await.unwrap();
    let mut outsider_rx = listen(&outsider, "user_message");

    let delivered: usize = members[0]
        .0
        .path("chat")
        .path("send_message")
        .call_as(params!["hello"])
        .await
        .unwrap();
    assert_eq!(delivered, MEMBERS);

    for (_, rx) in &mut members {
        let data = recv(rx).await;
        assert_eq!(data["message"], "hello");
        assert_eq!(data["user"]["username"], "user-0");
    }

    settle().await;
    for (_, rx) in &mut members {
        assert!(rx.try_recv().is_err());
    }
    assert!(outsider_rx.try_recv().is_err());
}

#[tokio::test]
async fn non_member_cannot_send() {
    let server = server();
    let client = local_client(&server);
    let _ = client.connect().await.unwrap();
    let err = client
        .path("chat")
        .path("send_message")
        .call(params!["hi"])
        .await
        .unwrap_err();
    assert_eq!(err.reason(), Some("NOT_JOINED"));
}

// ── HTTP ────────────────────────────────────────────────────────────

#[tokio::test]
async fn chat_over_http() {
    let server = server();
    let handle = server.start().await.unwrap();
    let route = format!("{}/rpc", handle.origin());

    let a = Client::new(&route).unwrap();
    let b = Client::new(&route).unwrap();
    let _ = a.connect().await.unwrap();
    let _ = b.connect().await.unwrap();
    let mut messages = listen(&b, "user_message");

    let _ = join(&a, "ada").await;
    let _ = join(&b, "grace").await;
    a.path("chat")
        .path("send_message")
        .call(params!["over the wire"])
        .await
        .unwrap();

    let data = recv(&mut messages).await;
    assert_eq!(data["message"], "over the wire");
    assert_eq!(data["user"]["username"], "ada");

    handle.shutdown(Some(Duration::from_secs(2))).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), b.status()).await;
    assert_matches!(b.path("chat").on("user_message", |_| {}), Err(ClientError::ChannelClosed));
}
