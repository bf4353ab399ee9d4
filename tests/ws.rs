//! WebSocket event streaming against a live server.

#![allow(clippy::panic)]

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio_tungstenite::tungstenite::Message;

use tg_escrow_gateway::api;

use common::{ADVERTISER, OWNER, TestApp, spawn_app};

type Socket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(app: &TestApp) -> SocketAddr {
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("bind failed");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("no local addr");
    };
    let router = api::build_app(app.state().clone(), Duration::from_secs(5), false);
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let Ok((socket, _)) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws")).await else {
        panic!("ws connect failed");
    };
    socket
}

async fn command(socket: &mut Socket, id: &str, payload: Value) -> Value {
    let msg = json!({
        "id": id,
        "type": "command",
        "timestamp": chrono::Utc::now(),
        "payload": payload,
    });
    if socket.send(Message::text(msg.to_string())).await.is_err() {
        panic!("send failed");
    }
    next_json(socket).await
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let next = tokio::time::timeout(Duration::from_secs(2), socket.next()).await;
        let Ok(Some(Ok(msg))) = next else {
            panic!("no message from server");
        };
        if let Ok(text) = msg.to_text()
            && !text.is_empty()
        {
            let Ok(value) = serde_json::from_str(text) else {
                panic!("server sent invalid JSON: {text}");
            };
            return value;
        }
    }
}

async fn create_deal_over_http(addr: SocketAddr) -> String {
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/deals"))
        .json(&json!({
            "advertiser_id": ADVERTISER.get(),
            "channel_id": -100_777,
            "channel_owner_id": OWNER.get(),
            "price_amount": "75",
            "price_currency": "TON",
            "brief": "Wallet app launch"
        }))
        .send()
        .await;
    let Ok(response) = response else {
        panic!("http request failed");
    };
    let Ok(body) = response.json::<Value>().await else {
        panic!("invalid body");
    };
    let Some(id) = body["deal_id"].as_str() else {
        panic!("deal_id missing: {body}");
    };
    id.to_string()
}

#[tokio::test]
async fn wildcard_subscriber_sees_new_deals() {
    let app = spawn_app();
    let addr = serve(&app).await;
    let mut socket = connect(addr).await;

    let reply = command(&mut socket, "sub-1", json!({ "command": "subscribe", "deal_ids": ["*"] })).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["id"], "sub-1");
    assert_eq!(reply["payload"]["wildcard"], true);

    let deal_id = create_deal_over_http(addr).await;
    let event = next_json(&mut socket).await;
    assert_eq!(event["type"], "event");
    assert_eq!(event["payload"]["event_type"], "deal_created");
    assert_eq!(event["payload"]["deal_id"], deal_id.as_str());
}

#[tokio::test]
async fn per_deal_subscription_and_queries() {
    let app = spawn_app();
    let addr = serve(&app).await;
    let deal_id = create_deal_over_http(addr).await;
    let mut socket = connect(addr).await;

    let reply = command(&mut socket, "q", json!({ "command": "get_deal", "deal_id": deal_id })).await;
    assert_eq!(reply["type"], "response");
    assert_eq!(reply["payload"]["status"], "submitted");

    let reply = command(&mut socket, "s", json!({ "command": "subscribe", "deal_ids": [deal_id] })).await;
    assert_eq!(reply["payload"]["count"], 1);

    let _ = create_deal_over_http(addr).await;
    let _ = reqwest::Client::new()
        .post(format!("http://{addr}/api/v1/deals/{deal_id}/actions"))
        .json(&json!({
            "actor_role": "advertiser",
            "actor_id": ADVERTISER.get(),
            "action": { "type": "cancel" }
        }))
        .send()
        .await;

    let event = loop {
        let event = next_json(&mut socket).await;
        if event["payload"]["event_type"] == "status_changed" {
            break event;
        }
        assert_eq!(event["payload"]["deal_id"], deal_id.as_str());
    };
    assert_eq!(event["payload"]["deal_id"], deal_id.as_str());
    assert_eq!(event["payload"]["to"], "cancelled");
}

#[tokio::test]
async fn malformed_and_unknown_commands_get_errors() {
    let app = spawn_app();
    let addr = serve(&app).await;
    let mut socket = connect(addr).await;

    if socket.send(Message::text("not json")).await.is_err() {
        panic!("send failed");
    }
    let reply = next_json(&mut socket).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], 400);

    let reply = command(&mut socket, "x", json!({ "command": "teleport" })).await;
    assert_eq!(reply["type"], "error");
    assert_eq!(reply["payload"]["code"], 404);
}
