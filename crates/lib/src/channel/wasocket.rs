//! WhatsApp session-gateway socket client.
//!
//! The authenticated WhatsApp session lives in an external session gateway;
//! this connector dials its WebSocket endpoint and speaks a small JSON
//! protocol: `req`/`res` frames for sends (acked with the channel-assigned
//! message id) and `event` frames for inbound messages. One task owns the
//! socket; sends are queued to it over a command channel and matched to acks
//! by frame id. On close the session loop reconnects with bounded exponential
//! backoff — unless the gateway closed with the logged-out code, which means
//! the stored channel credentials were revoked and retrying is pointless.

use crate::channel::connector::{
    ChannelConnector, ChannelEvent, CloseReason, ConnectivityState, InboundMessage, MessageBody,
    MessageId, SendError,
};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Close code the session gateway uses when the channel session was logged
/// out / revoked. Any other close is an ordinary interruption.
pub const CLOSE_CODE_LOGGED_OUT: u16 = 4401;

/// How long a send may wait for the gateway's acknowledgement.
const SEND_ACK_TIMEOUT: Duration = Duration::from_secs(15);

const RECONNECT_BASE: Duration = Duration::from_millis(500);
const RECONNECT_CAP: Duration = Duration::from_secs(30);

/// Bounded exponential backoff: 500ms, 1s, 2s, ... capped at 30s.
fn reconnect_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    RECONNECT_BASE.saturating_mul(1u32 << shift).min(RECONNECT_CAP)
}

struct SendCommand {
    to: String,
    text: String,
    ack: oneshot::Sender<Result<MessageId, SendError>>,
}

/// Connector to the WhatsApp session gateway. Create with [`WaSocket::new`],
/// run with [`WaSocket::start`], send through the [`ChannelConnector`] impl.
pub struct WaSocket {
    url: String,
    connected: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    cmd_tx: mpsc::Sender<SendCommand>,
    cmd_rx: StdMutex<Option<mpsc::Receiver<SendCommand>>>,
}

impl WaSocket {
    pub fn new(url: impl Into<String>) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            url: url.into(),
            connected: AtomicBool::new(false),
            shutdown_tx,
            cmd_tx,
            cmd_rx: StdMutex::new(Some(cmd_rx)),
        })
    }

    fn running(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// True while a session to the gateway is open.
    pub fn connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Start the session loop. Connectivity and inbound-message events are
    /// emitted on `event_tx` in arrival order. The returned handle resolves
    /// when the loop ends: `stop()`, a fatal logged-out close, or the event
    /// consumer going away.
    pub fn start(self: Arc<Self>, event_tx: mpsc::Sender<ChannelEvent>) -> JoinHandle<()> {
        let Some(cmd_rx) = self.cmd_rx.lock().ok().and_then(|mut g| g.take()) else {
            log::error!("channel connector: start called twice; ignoring");
            return tokio::spawn(async {});
        };
        let shutdown_rx = self.shutdown_tx.subscribe();
        log::info!("channel connector: starting session loop ({})", self.url);
        tokio::spawn(async move {
            run_session_loop(self, cmd_rx, shutdown_rx, event_tx).await;
        })
    }
}

#[async_trait]
impl ChannelConnector for WaSocket {
    async fn send_text(&self, address: &str, text: &str) -> Result<MessageId, SendError> {
        if !self.connected() {
            return Err(SendError::NotConnected);
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        let cmd = SendCommand {
            to: address.to_string(),
            text: text.to_string(),
            ack: ack_tx,
        };
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| SendError::NotConnected)?;
        match tokio::time::timeout(SEND_ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(outcome)) => outcome,
            // The session ended before the ack; the pending entry was dropped.
            Ok(Err(_)) => Err(SendError::NotConnected),
            Err(_) => Err(SendError::AckTimeout),
        }
    }

    fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

/// Explicit reconnect loop: dial, drive the session until it closes, classify
/// the close. Logged-out is terminal; everything else backs off and retries.
async fn run_session_loop(
    sock: Arc<WaSocket>,
    mut cmd_rx: mpsc::Receiver<SendCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
    event_tx: mpsc::Sender<ChannelEvent>,
) {
    let mut attempt: u32 = 0;
    while sock.running() {
        if event_tx
            .send(ChannelEvent::Connectivity(ConnectivityState::Connecting))
            .await
            .is_err()
        {
            return;
        }
        let close = match connect_async(&sock.url).await {
            Ok((ws, _)) => {
                attempt = 0;
                sock.connected.store(true, Ordering::SeqCst);
                if event_tx
                    .send(ChannelEvent::Connectivity(ConnectivityState::Open))
                    .await
                    .is_err()
                {
                    sock.connected.store(false, Ordering::SeqCst);
                    return;
                }
                let reason =
                    drive_session(ws, &mut cmd_rx, &mut shutdown_rx, &event_tx).await;
                sock.connected.store(false, Ordering::SeqCst);
                reason
            }
            Err(e) => CloseReason::Interrupted(format!("dial {}: {}", sock.url, e)),
        };
        if !sock.running() {
            return;
        }
        let fatal = close.is_fatal();
        if event_tx
            .send(ChannelEvent::Connectivity(ConnectivityState::Closed(close)))
            .await
            .is_err()
        {
            return;
        }
        if fatal {
            let _ = sock.shutdown_tx.send(true);
            return;
        }
        attempt += 1;
        let delay = reconnect_delay(attempt);
        log::info!(
            "channel connector: reconnecting in {:?} (attempt {})",
            delay,
            attempt
        );
        tokio::select! {
            _ = sleep(delay) => {}
            _ = shutdown_rx.changed() => return,
        }
    }
}

/// Drive one open session: write queued sends, match acks by frame id,
/// forward inbound message events. Returns why the session ended; pending
/// sends are failed on the way out.
async fn drive_session(
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    cmd_rx: &mut mpsc::Receiver<SendCommand>,
    shutdown_rx: &mut watch::Receiver<bool>,
    event_tx: &mpsc::Sender<ChannelEvent>,
) -> CloseReason {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<String, oneshot::Sender<Result<MessageId, SendError>>> =
        HashMap::new();
    let mut next_id: u64 = 1;

    let reason = loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                break CloseReason::Interrupted("connector stopped".to_string());
            }
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    break CloseReason::Interrupted("command channel closed".to_string());
                };
                let id = next_id.to_string();
                next_id += 1;
                let frame = send_frame(&id, &cmd.to, &cmd.text);
                match sink.send(Message::Text(frame)).await {
                    Ok(()) => {
                        pending.insert(id, cmd.ack);
                    }
                    Err(e) => {
                        let _ = cmd.ack.send(Err(SendError::Transport(e.to_string())));
                        break CloseReason::Interrupted(format!("socket write failed: {}", e));
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break CloseReason::Interrupted("connection closed".to_string()),
                    Some(Err(e)) => break CloseReason::Interrupted(e.to_string()),
                    Some(Ok(Message::Close(frame))) => break close_reason(frame),
                    Some(Ok(Message::Text(text))) => {
                        if !handle_frame(&text, &mut pending, event_tx).await {
                            break CloseReason::Interrupted("event consumer gone".to_string());
                        }
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    };
    for (_, ack) in pending.drain() {
        let _ = ack.send(Err(SendError::NotConnected));
    }
    reason
}

/// Handle one text frame from the gateway. Returns false when the event
/// consumer has gone away (the bridge is shutting down).
async fn handle_frame(
    text: &str,
    pending: &mut HashMap<String, oneshot::Sender<Result<MessageId, SendError>>>,
    event_tx: &mpsc::Sender<ChannelEvent>,
) -> bool {
    let frame: GatewayFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            log::debug!("channel connector: undecodable frame ({}): {}", e, text);
            return true;
        }
    };
    match frame {
        GatewayFrame::Res(res) => {
            let Some(ack) = pending.remove(&res.id) else {
                log::debug!("channel connector: ack for unknown send {}", res.id);
                return true;
            };
            let outcome = if res.ok {
                res.payload
                    .as_ref()
                    .and_then(|p| p.get("messageId"))
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| SendError::Rejected("ack missing messageId".to_string()))
            } else {
                Err(SendError::Rejected(
                    res.error.unwrap_or_else(|| "unknown error".to_string()),
                ))
            };
            let _ = ack.send(outcome);
            true
        }
        GatewayFrame::Event(ev) if ev.event == "message" => {
            match serde_json::from_value::<MessagePayload>(ev.payload) {
                Ok(payload) => event_tx
                    .send(ChannelEvent::Message(payload.into_inbound()))
                    .await
                    .is_ok(),
                Err(e) => {
                    log::debug!("channel connector: bad message payload: {}", e);
                    true
                }
            }
        }
        GatewayFrame::Event(ev) => {
            log::debug!("channel connector: ignoring event {}", ev.event);
            true
        }
    }
}

fn send_frame(id: &str, to: &str, text: &str) -> String {
    serde_json::json!({
        "type": "req",
        "id": id,
        "method": "send",
        "params": { "to": to, "text": text },
    })
    .to_string()
}

fn close_reason(frame: Option<CloseFrame<'_>>) -> CloseReason {
    match frame {
        Some(f) if u16::from(f.code) == CLOSE_CODE_LOGGED_OUT => CloseReason::LoggedOut,
        Some(f) => {
            CloseReason::Interrupted(format!("closed ({}): {}", u16::from(f.code), f.reason))
        }
        None => CloseReason::Interrupted("closed without a reason".to_string()),
    }
}

/// Gateway→client frame: `res` (send ack) or `event` (inbound traffic).
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum GatewayFrame {
    Res(ResFrame),
    Event(EventFrame),
}

#[derive(Debug, Deserialize)]
struct ResFrame {
    id: String,
    ok: bool,
    #[serde(default)]
    payload: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventFrame {
    event: String,
    #[serde(default)]
    payload: serde_json::Value,
}

/// Inbound `message` event payload as the gateway sends it.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessagePayload {
    #[serde(default)]
    id: String,
    from: String,
    #[serde(default)]
    from_me: bool,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    quoted_id: Option<String>,
}

impl MessagePayload {
    /// Decode the message shape once, at the boundary: quoted text can be
    /// routed, plain text cannot, anything without text is opaque.
    fn into_inbound(self) -> InboundMessage {
        let body = match (self.quoted_id, self.text) {
            (Some(quoted_id), Some(text)) => MessageBody::Quoted { quoted_id, text },
            (None, Some(text)) => MessageBody::Plain { text },
            _ => MessageBody::Other,
        };
        InboundMessage {
            id: self.id,
            from: self.from,
            from_me: self.from_me,
            body,
        }
    }
}
