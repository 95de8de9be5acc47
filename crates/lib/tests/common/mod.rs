//! Shared helpers: a scripted connector and a bridge spawner.
#![allow(dead_code)]

use async_trait::async_trait;
use lib::channel::{ChannelConnector, ChannelEvent, MessageId, SendError};
use lib::config::Config;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

/// Operator number the test bridges are configured with.
pub const OPERATOR_NUMBER: &str = "254700000001";
pub const OPERATOR_ADDRESS: &str = "254700000001@s.whatsapp.net";

/// Connector that acks every send with WAMID-n, or fails while `down`.
pub struct ScriptedConnector {
    pub sent: Mutex<Vec<(String, String)>>,
    next_id: AtomicU64,
    down: AtomicBool,
}

impl ScriptedConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            down: AtomicBool::new(false),
        })
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChannelConnector for ScriptedConnector {
    async fn send_text(&self, address: &str, text: &str) -> Result<MessageId, SendError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SendError::NotConnected);
        }
        self.sent
            .lock()
            .await
            .push((address.to_string(), text.to_string()));
        Ok(format!(
            "WAMID-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ))
    }

    fn stop(&self) {}
}

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Start a bridge on a free port with the given connector; returns the port
/// and the channel-event sender feeding the bridge's relay loop. The server
/// task is left running when the test ends.
pub async fn spawn_bridge(connector: Arc<dyn ChannelConnector>) -> (u16, mpsc::Sender<ChannelEvent>) {
    let port = free_port();
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.channel.operator_number = Some(OPERATOR_NUMBER.to_string());

    let (channel_tx, channel_rx) = mpsc::channel(64);
    tokio::spawn(async move {
        let _ = lib::gateway::serve(config, connector, channel_rx).await;
    });
    wait_until_healthy(port).await;
    (port, channel_tx)
}

/// Poll GET /health until the bridge answers.
pub async fn wait_until_healthy(port: u16) {
    let url = format!("http://127.0.0.1:{}/health", port);
    let client = reqwest::Client::new();
    for _ in 0..100 {
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("bridge on port {} did not become healthy within 5s", port);
}

/// Fetch and parse GET /health.
pub async fn health(port: u16) -> serde_json::Value {
    reqwest::get(format!("http://127.0.0.1:{}/health", port))
        .await
        .expect("GET /health")
        .json()
        .await
        .expect("parse health JSON")
}
