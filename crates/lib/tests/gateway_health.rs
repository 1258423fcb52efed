//! Integration test: start the gateway on a free port, GET /, assert health JSON; post
//! activities to /api/messages and check they reach the dispatcher.
//! Does not reach any bot service: the full-stack test never posts an event.
//! The server task is left running when the test ends.

mod common;

use common::{FakeConnector, FakeRecorder, StaticCard, SERVICE_URL};
use herald_core::config::{Config, GatewayConfig};
use herald_core::dispatch::{DispatchOptions, Dispatcher};
use herald_core::gateway;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

fn temp_config_dir() -> (PathBuf, PathBuf) {
    let dir = std::env::temp_dir().join(format!("herald-gateway-test-{}", uuid::Uuid::new_v4()));
    std::fs::create_dir_all(&dir).expect("create config dir");
    let config_path = dir.join("config.json");
    std::fs::File::create(&config_path)
        .and_then(|mut f| f.write_all(b"{}"))
        .expect("write config.json");
    (dir, config_path)
}

fn loopback(port: u16) -> GatewayConfig {
    GatewayConfig {
        port,
        bind: "127.0.0.1".to_string(),
    }
}

async fn wait_for_health(client: &reqwest::Client, port: u16) -> serde_json::Value {
    let url = format!("http://127.0.0.1:{}/", port);
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}

/// Gateway backed by in-memory fakes; returns the connector so tests can inspect calls.
fn spawn_fake_gateway(port: u16) -> Arc<FakeConnector> {
    let connector = Arc::new(FakeConnector::new());
    let dispatcher = Arc::new(Dispatcher::new(
        connector.clone(),
        Arc::new(FakeRecorder::default()),
        &StaticCard,
        DispatchOptions::default(),
    ));
    tokio::spawn(async move {
        let _ = gateway::serve(&loopback(port), dispatcher, std::future::pending()).await;
    });
    connector
}

#[tokio::test]
async fn gateway_health_http_responds_with_running() {
    let port = free_port();
    let (temp_dir, config_path) = temp_config_dir();

    let mut config = Config::default();
    config.gateway = loopback(port);
    config.bot.app_id = Some("00000000-0000-0000-0000-000000000001".to_string());
    config.bot.app_secret = Some("secret".to_string());
    config.bot.base_uri = Some("https://herald.example.com".to_string());
    config.store.path = Some(temp_dir.join("installations.json"));

    let gateway_handle = tokio::spawn(async move {
        let _ = gateway::run_gateway(config, config_path).await;
    });

    let json = wait_for_health(&reqwest::Client::new(), port).await;
    assert_eq!(json.get("runtime").and_then(|v| v.as_str()), Some("running"));
    assert_eq!(json.get("port").and_then(|v| v.as_u64()), Some(port as u64));
    gateway_handle.abort();
}

#[tokio::test]
async fn conversation_update_is_dispatched() {
    let port = free_port();
    let connector = spawn_fake_gateway(port);
    let client = reqwest::Client::new();
    wait_for_health(&client, port).await;

    let activity = serde_json::json!({
        "type": "conversationUpdate",
        "id": "f:1",
        "channelId": "msteams",
        "serviceUrl": SERVICE_URL,
        "recipient": { "id": "28:bot-1", "name": "Herald" },
        "conversation": { "id": "a:personal-1", "tenantId": "t1", "conversationType": "personal" },
        "membersAdded": [{ "id": "29:u9", "name": "Ada" }]
    });
    let resp = client
        .post(format!("http://127.0.0.1:{}/api/messages", port))
        .json(&activity)
        .send()
        .await
        .expect("post activity");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    for _ in 0..100 {
        if !connector.sent().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let sent = connector.sent();
    assert_eq!(sent.len(), 1, "calls: {:?}", connector.calls());
    assert_eq!(sent[0].1, "29:u9");
}

#[tokio::test]
async fn malformed_activity_is_rejected_and_messages_are_ignored() {
    let port = free_port();
    let connector = spawn_fake_gateway(port);
    let client = reqwest::Client::new();
    wait_for_health(&client, port).await;
    let url = format!("http://127.0.0.1:{}/api/messages", port);

    let resp = client
        .post(&url)
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .expect("post malformed");
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);

    let resp = client
        .post(&url)
        .json(&serde_json::json!({
            "type": "message",
            "text": "hello",
            "recipient": { "id": "28:bot-1" },
            "membersAdded": [{ "id": "29:u1" }]
        }))
        .send()
        .await
        .expect("post message");
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(connector.calls().is_empty());
}
