//! Relay orchestration between visitor sessions and the operator channel.
//!
//! Visitor→operator: prefix the banner, send to the operator address, record
//! the ack'd message id against the visitor session. Operator→visitor: only a
//! quoted reply is routable; the quoted id resolves to the owning session.

use crate::channel::{ChannelConnector, InboundMessage, MessageBody, MessageId, SendError};
use crate::gateway::{ConnectionRegistry, VisitorEvent};
use crate::relay::correlations::CorrelationStore;
use std::sync::Arc;

/// Prefix stamped on every forwarded visitor message so the operator can tell
/// website traffic from personal chats.
const VISITOR_BANNER: &str = "💬 New website visitor message:\n\n";

pub struct RelayCore {
    connector: Arc<dyn ChannelConnector>,
    connections: Arc<ConnectionRegistry>,
    correlations: CorrelationStore,
    operator_address: String,
}

impl RelayCore {
    pub fn new(
        connector: Arc<dyn ChannelConnector>,
        connections: Arc<ConnectionRegistry>,
        operator_address: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            connections,
            correlations: CorrelationStore::new(),
            operator_address: operator_address.into(),
        }
    }

    /// Canonical operator address every visitor message is sent to.
    pub fn operator_address(&self) -> &str {
        &self.operator_address
    }

    /// Forward a visitor message to the operator. On success the channel
    /// message id is correlated to the session before this returns, so a
    /// quoted reply can never observe the send without its correlation.
    pub async fn forward_visitor_message(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<MessageId, SendError> {
        let outbound = format!("{}{}", VISITOR_BANNER, text);
        let message_id = self
            .connector
            .send_text(&self.operator_address, &outbound)
            .await?;
        self.correlations
            .record(message_id.clone(), session_id)
            .await;
        log::debug!("relay: {} forwarded as {}", session_id, message_id);
        Ok(message_id)
    }

    /// Route one inbound channel message. Only a quoted reply from the
    /// operator is routable; everything else is dropped with a diagnostic.
    pub async fn route_operator_message(&self, msg: InboundMessage) {
        if msg.from_me {
            log::debug!("relay: ignoring own echo {}", msg.id);
            return;
        }
        if msg.from != self.operator_address {
            log::debug!("relay: ignoring message from {} (not the operator)", msg.from);
            return;
        }
        let (quoted_id, text) = match msg.body {
            MessageBody::Quoted { quoted_id, text } => (quoted_id, text),
            MessageBody::Plain { .. } => {
                log::debug!("relay: operator message {} quotes nothing, unroutable", msg.id);
                return;
            }
            MessageBody::Other => {
                log::debug!("relay: operator message {} has no text, unroutable", msg.id);
                return;
            }
        };
        let Some(session_id) = self.correlations.resolve(&quoted_id).await else {
            log::debug!("relay: no correlation for quoted {}", quoted_id);
            return;
        };
        if self
            .connections
            .deliver(&session_id, VisitorEvent::from_operator(text))
            .await
        {
            log::info!("relay: reply {} delivered to {}", msg.id, session_id);
        } else {
            log::debug!("relay: reply {} for {} dropped, session gone", msg.id, session_id);
        }
    }

    /// Purge all correlations for a disconnected visitor.
    pub async fn purge_session(&self, session_id: &str) {
        let removed = self.correlations.purge_session(session_id).await;
        if removed > 0 {
            log::info!("relay: purged {} correlation(s) for {}", removed, session_id);
        }
    }

    /// Live correlation count, for health reporting.
    pub async fn correlation_count(&self) -> usize {
        self.correlations.count().await
    }
}
