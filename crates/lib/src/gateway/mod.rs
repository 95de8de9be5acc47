//! Gateway: visitor WebSocket endpoint plus the HTTP ingress.
//!
//! Single port serves `GET /ws` (one connection per visitor), `POST
//! /send-whatsapp`, and `GET /health`.

pub mod connections;
mod protocol;
mod server;

pub use connections::{new_session_id, ConnectionRegistry};
pub use protocol::{VisitorCommand, VisitorEvent, OPERATOR_DISPLAY_NAME};
pub use server::{run_gateway, serve, GatewayState};
