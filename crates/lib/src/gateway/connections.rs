//! Live visitor connections.
//!
//! One entry per open visitor socket: session id -> buffered sender into that
//! socket's task. Deliveries use `try_send`, so a slow visitor loses frames
//! instead of stalling reply routing.

use crate::gateway::protocol::VisitorEvent;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Frames buffered per connection before a slow visitor starts losing them.
const CONNECTION_BUFFER: usize = 16;

/// Mint a fresh visitor session id.
pub fn new_session_id() -> String {
    format!("visitor-{}", Uuid::new_v4())
}

/// Registry of open visitor connections. Shared across the gateway.
pub struct ConnectionRegistry {
    inner: RwLock<HashMap<String, mpsc::Sender<VisitorEvent>>>,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection; returns the receiving end for its socket task.
    pub async fn register(&self, session_id: &str) -> mpsc::Receiver<VisitorEvent> {
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        let mut g = self.inner.write().await;
        g.insert(session_id.to_string(), tx);
        rx
    }

    /// Drop the connection entry. Idempotent.
    pub async fn unregister(&self, session_id: &str) {
        self.inner.write().await.remove(session_id);
    }

    /// Queue an event for a session without blocking. Returns false when the
    /// session is gone or its buffer is full (the frame is dropped).
    pub async fn deliver(&self, session_id: &str, event: VisitorEvent) -> bool {
        let g = self.inner.read().await;
        let Some(tx) = g.get(session_id) else {
            return false;
        };
        match tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                log::debug!("gateway: dropping frame for {}: {}", session_id, e);
                false
            }
        }
    }

    /// Open connection count, for health reporting.
    pub async fn count(&self) -> usize {
        self.inner.read().await.len()
    }
}
