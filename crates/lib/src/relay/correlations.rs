//! Message-to-visitor correlation for reply routing.
//!
//! Every relayed visitor message is recorded under the channel-assigned
//! message id; when the operator quotes one of those messages, the quoted id
//! resolves back to the visitor session. Delivery never consumes an entry, so
//! one message can anchor any number of replies. Entries die with their
//! visitor session.

use crate::channel::MessageId;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory map: channel message id -> visitor session id.
pub struct CorrelationStore {
    entries: RwLock<HashMap<MessageId, String>>,
}

impl Default for CorrelationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CorrelationStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Record that `message_id` carries traffic for `session_id`. A reused id
    /// overwrites the older entry; id uniqueness is the channel's business.
    pub async fn record(&self, message_id: impl Into<MessageId>, session_id: impl Into<String>) {
        let message_id = message_id.into();
        let session_id = session_id.into();
        let mut entries = self.entries.write().await;
        if let Some(old) = entries.insert(message_id.clone(), session_id.clone()) {
            if old != session_id {
                log::warn!(
                    "correlation {} rebound from session {} to {}",
                    message_id,
                    old,
                    session_id
                );
            }
        }
    }

    /// Resolve the visitor session a quoted message belongs to. Read-only:
    /// resolving never removes the correlation.
    pub async fn resolve(&self, message_id: &str) -> Option<String> {
        self.entries.read().await.get(message_id).cloned()
    }

    /// Drop every correlation bound to `session_id`. Returns how many entries
    /// were removed.
    pub async fn purge_session(&self, session_id: &str) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, bound| bound != session_id);
        before - entries.len()
    }

    /// Number of live correlations, for health reporting.
    pub async fn count(&self) -> usize {
        self.entries.read().await.len()
    }
}
