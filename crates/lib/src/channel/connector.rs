//! Channel connector contract: outbound sends, inbound events, connectivity lifecycle.
//!
//! The connector that owns the authenticated WhatsApp session is consumed, not
//! implemented, by the relay: everything downstream is written against this
//! trait and these event types so tests can substitute a scripted connector.

use async_trait::async_trait;

/// Channel-assigned identifier of an outbound message (opaque string).
pub type MessageId = String;

/// Why an outbound send did not reach the channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// No session to the channel is open; fails fast until reconnection completes.
    #[error("channel connector is not connected")]
    NotConnected,
    /// The channel accepted the request but refused the message.
    #[error("channel rejected send: {0}")]
    Rejected(String),
    /// The transport failed mid-send.
    #[error("channel transport error: {0}")]
    Transport(String),
    /// The channel never acknowledged the send.
    #[error("timed out waiting for send acknowledgement")]
    AckTimeout,
}

/// Why a connector session closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The channel session was logged out / revoked. Fatal: stored credentials
    /// need re-authorization, so reconnecting is pointless.
    LoggedOut,
    /// Everything else (network blip, server-initiated restart, dial failure).
    Interrupted(String),
}

impl CloseReason {
    pub fn is_fatal(&self) -> bool {
        matches!(self, CloseReason::LoggedOut)
    }
}

/// Connector lifecycle, observed via events. Not owned by the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectivityState {
    Connecting,
    Open,
    Closed(CloseReason),
}

/// Inbound message content, decoded once at the connector boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    /// Ordinary text with no quote metadata. Unroutable for the relay.
    Plain { text: String },
    /// Text quoting an earlier message — the only shape the relay can route.
    Quoted { quoted_id: MessageId, text: String },
    /// Media, reactions, receipts: nothing the relay handles.
    Other,
}

/// One inbound message from the channel.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// The message's own channel id (diagnostics only; routing uses the quote).
    pub id: MessageId,
    /// Canonical address of the chat the message arrived from.
    pub from: String,
    /// True for echoes of messages this side sent.
    pub from_me: bool,
    pub body: MessageBody,
}

/// Element of a connector's event stream. A single consumer must process
/// these in arrival order; the channel's own ordering is authoritative.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Connectivity(ConnectivityState),
    Message(InboundMessage),
}

/// Handle to a running channel connector.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Send `text` to `address`; returns the channel-assigned message id.
    async fn send_text(&self, address: &str, text: &str) -> Result<MessageId, SendError>;

    /// Stop the connector (ends the session loop; no further reconnects).
    fn stop(&self);
}
