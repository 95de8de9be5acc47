//! HTTP ingress tests: /health and /send-whatsapp against a scripted connector.

mod common;

use common::{health, spawn_bridge, ScriptedConnector};

#[tokio::test]
async fn health_reports_counts() {
    let connector = ScriptedConnector::new();
    let (port, _channel_tx) = spawn_bridge(connector).await;

    let json = health(port).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["active_connections"], 0);
    assert_eq!(json["mapped_messages"], 0);
}

#[tokio::test]
async fn send_whatsapp_normalizes_and_succeeds() {
    let connector = ScriptedConnector::new();
    let (port, _channel_tx) = spawn_bridge(connector.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/send-whatsapp", port))
        .json(&serde_json::json!({
            "phone": "0712345678",
            "message": "Booking confirmed for Friday"
        }))
        .send()
        .await
        .expect("POST /send-whatsapp");
    assert!(resp.status().is_success());

    let json: serde_json::Value = resp.json().await.expect("parse response");
    assert_eq!(json["status"], "success");
    assert_eq!(json["method"], "whatsapp");

    let sent = connector.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "254712345678@s.whatsapp.net");
    assert_eq!(sent[0].1, "Booking confirmed for Friday");
}

#[tokio::test]
async fn send_whatsapp_surfaces_connector_failure_as_500() {
    let connector = ScriptedConnector::new();
    connector.set_down(true);
    let (port, _channel_tx) = spawn_bridge(connector.clone()).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/send-whatsapp", port))
        .json(&serde_json::json!({ "phone": "+254712345678", "message": "hi" }))
        .send()
        .await
        .expect("POST /send-whatsapp");
    assert_eq!(resp.status().as_u16(), 500);

    let json: serde_json::Value = resp.json().await.expect("parse response");
    assert_eq!(json["status"], "error");
    assert_eq!(json["method"], "whatsapp");
    assert!(json["error"].as_str().unwrap_or("").contains("not connected"));
    assert!(connector.sent.lock().await.is_empty());
}

#[tokio::test]
async fn ingress_sends_never_create_correlations() {
    let connector = ScriptedConnector::new();
    let (port, _channel_tx) = spawn_bridge(connector).await;

    let resp = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/send-whatsapp", port))
        .json(&serde_json::json!({ "phone": "0712345678", "message": "notification" }))
        .send()
        .await
        .expect("POST /send-whatsapp");
    assert!(resp.status().is_success());

    let json = health(port).await;
    assert_eq!(json["mapped_messages"], 0);
}
