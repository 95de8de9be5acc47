//! Bridge HTTP + WebSocket server (single port).

use crate::channel::{
    normalize_address, ChannelConnector, ChannelEvent, CloseReason, ConnectivityState, WaSocket,
};
use crate::config::{self, Config};
use crate::gateway::connections::{new_session_id, ConnectionRegistry};
use crate::gateway::protocol::{VisitorCommand, VisitorEvent};
use crate::relay::RelayCore;
use anyhow::{Context, Result};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::StatusCode,
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, watch};

/// Frame broadcast to every visitor socket right before the bridge goes down.
const SHUTDOWN_EVENT_JSON: &str = r#"{"event":"error","message":"bridge is shutting down"}"#;

/// Shared state for the bridge (config, relay, connections, connector).
#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    /// Broadcasts pre-serialized frames to every visitor socket (shutdown notice).
    pub event_tx: broadcast::Sender<String>,
    pub connections: Arc<ConnectionRegistry>,
    pub relay: Arc<RelayCore>,
    pub connector: Arc<dyn ChannelConnector>,
}

/// Latched fatal-error slot: trips the graceful shutdown and is read back
/// after the server exits so the process can fail with the reason.
struct FatalSignal {
    tx: watch::Sender<Option<String>>,
}

impl FatalSignal {
    fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx }
    }

    /// Latch the reason; the first one wins.
    fn trigger(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(reason);
                true
            } else {
                false
            }
        });
    }

    async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if rx.borrow().is_some() {
                return;
            }
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    fn reason(&self) -> Option<String> {
        self.tx.borrow().clone()
    }
}

/// Run the bridge; binds to config.gateway.bind:config.gateway.port.
/// Blocks until shutdown (Ctrl+C, SIGTERM, or a fatal channel logout).
/// A fatal logout is returned as an error so the process exits nonzero.
pub async fn run_gateway(config: Config) -> Result<()> {
    let connector_url = config::resolve_connector_url(&config);
    let socket = WaSocket::new(connector_url);
    let (channel_tx, channel_rx) = mpsc::channel::<ChannelEvent>(64);
    let connector_task = socket.clone().start(channel_tx);

    let result = serve(config, socket, channel_rx).await;
    let _ = connector_task.await;
    result
}

/// Serve the bridge with the given connector and its event stream. Split from
/// [`run_gateway`] so tests can drive the bridge with a scripted connector.
pub async fn serve(
    config: Config,
    connector: Arc<dyn ChannelConnector>,
    channel_rx: mpsc::Receiver<ChannelEvent>,
) -> Result<()> {
    let operator_number = config::resolve_operator_number(&config);
    let operator_address = normalize_address(
        &operator_number,
        &config.channel.country_code,
        &config.channel.trunk_prefix,
    );
    log::info!("relaying visitor messages to {}", operator_address);

    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "binding to {} — visitor connections are unauthenticated; front this port with a proxy you trust",
            bind
        );
    }

    let connections = Arc::new(ConnectionRegistry::new());
    let relay = Arc::new(RelayCore::new(
        connector.clone(),
        connections.clone(),
        operator_address,
    ));
    let fatal = Arc::new(FatalSignal::new());
    let (event_tx, _) = broadcast::channel(64);

    let state = GatewayState {
        config: Arc::new(config.clone()),
        event_tx: event_tx.clone(),
        connections,
        relay: relay.clone(),
        connector: connector.clone(),
    };

    // One consumer keeps channel events in arrival order.
    let consumer = tokio::spawn(consume_channel_events(
        channel_rx,
        relay.clone(),
        fatal.clone(),
    ));

    let app = Router::new()
        .route("/health", get(health_http))
        .route("/send-whatsapp", post(send_whatsapp))
        .route("/ws", get(ws_handler))
        .with_state(state);

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("bridge listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(
            event_tx,
            fatal.clone(),
            connector.clone(),
        ))
        .await
        .context("bridge server exited")?;

    let _ = consumer.await;

    if let Some(reason) = fatal.reason() {
        anyhow::bail!("{}", reason);
    }
    log::info!("bridge stopped");
    Ok(())
}

/// Single consumer of the connector event stream: logs connectivity
/// transitions, trips the fatal signal on logout, routes inbound messages.
async fn consume_channel_events(
    mut rx: mpsc::Receiver<ChannelEvent>,
    relay: Arc<RelayCore>,
    fatal: Arc<FatalSignal>,
) {
    while let Some(event) = rx.recv().await {
        match event {
            ChannelEvent::Connectivity(ConnectivityState::Connecting) => {
                log::debug!("channel: connecting");
            }
            ChannelEvent::Connectivity(ConnectivityState::Open) => {
                log::info!("channel: session open");
            }
            ChannelEvent::Connectivity(ConnectivityState::Closed(CloseReason::LoggedOut)) => {
                log::error!("channel: session logged out, stopping the bridge");
                fatal.trigger(
                    "whatsapp session logged out; re-link the device in the session gateway",
                );
            }
            ChannelEvent::Connectivity(ConnectivityState::Closed(CloseReason::Interrupted(
                why,
            ))) => {
                log::warn!("channel: session closed: {}", why);
            }
            ChannelEvent::Message(msg) => relay.route_operator_message(msg).await,
        }
    }
}

/// Future that completes when the process should shut down (SIGINT, SIGTERM,
/// or a fatal channel error). Notifies connected visitors and stops the
/// connector so the socket loops drain.
async fn shutdown_signal(
    event_tx: broadcast::Sender<String>,
    fatal: Arc<FatalSignal>,
    connector: Arc<dyn ChannelConnector>,
) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => log::info!("shutdown signal received, draining connections"),
        _ = terminate => log::info!("shutdown signal received, draining connections"),
        _ = fatal.wait() => log::error!("fatal channel error, draining connections"),
    }

    let _ = event_tx.send(SHUTDOWN_EVENT_JSON.to_string());
    connector.stop();
}

#[derive(Debug, Deserialize)]
struct SendWhatsappRequest {
    phone: String,
    message: String,
}

/// POST /send-whatsapp — direct operator notification for backend services.
/// Deliberately not correlated: replies to these have nowhere to route.
async fn send_whatsapp(
    State(state): State<GatewayState>,
    Json(req): Json<SendWhatsappRequest>,
) -> (StatusCode, Json<serde_json::Value>) {
    let address = normalize_address(
        &req.phone,
        &state.config.channel.country_code,
        &state.config.channel.trunk_prefix,
    );
    match state.connector.send_text(&address, &req.message).await {
        Ok(message_id) => {
            log::info!("send-whatsapp: delivered {} to {}", message_id, address);
            (
                StatusCode::OK,
                Json(json!({ "status": "success", "method": "whatsapp" })),
            )
        }
        Err(e) => {
            log::warn!("send-whatsapp: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "method": "whatsapp", "error": e.to_string() })),
            )
        }
    }
}

/// GET /health — liveness plus connection and correlation counts.
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_connections": state.connections.count().await,
        "mapped_messages": state.relay.correlation_count().await,
    }))
}

/// GET /ws upgrades to WebSocket; one connection per visitor session.
async fn ws_handler(State(state): State<GatewayState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: GatewayState) {
    let session_id = new_session_id();
    let mut delivery_rx = state.connections.register(&session_id).await;
    let mut event_rx = state.event_tx.subscribe();
    log::info!("visitor connected: {}", session_id);

    loop {
        tokio::select! {
            biased;

            event = event_rx.recv() => {
                match event {
                    Ok(text) => {
                        let is_shutdown = text == SHUTDOWN_EVENT_JSON;
                        let _ = socket.send(Message::Text(text)).await;
                        if is_shutdown {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        log::debug!("visitor {} lagged {} broadcast frames", session_id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            delivery = delivery_rx.recv() => {
                // The registry holds the sender; None only after unregister.
                let Some(event) = delivery else { break };
                let Ok(text) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            msg = socket.recv() => {
                let Some(Ok(msg)) = msg else { break };
                let Message::Text(text) = msg else { continue };
                let cmd: VisitorCommand = match serde_json::from_str(&text) {
                    Ok(c) => c,
                    Err(e) => {
                        log::debug!("visitor {}: undecodable frame: {}", session_id, e);
                        continue;
                    }
                };
                let VisitorCommand::SendMessage { text } = cmd;
                if let Err(e) = state.relay.forward_visitor_message(&session_id, &text).await {
                    log::warn!("visitor {}: forward failed: {}", session_id, e);
                    let event = VisitorEvent::error("message not sent, please try again shortly");
                    if let Ok(text) = serde_json::to_string(&event) {
                        let _ = socket.send(Message::Text(text)).await;
                    }
                }
            }
        }
    }

    state.connections.unregister(&session_id).await;
    state.relay.purge_session(&session_id).await;
    log::info!("visitor disconnected: {}", session_id);
}
