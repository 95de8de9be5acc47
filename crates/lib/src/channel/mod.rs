//! The operator-side messaging channel (WhatsApp).
//!
//! Connector contract and events, phone-number-to-address normalization, and
//! the session-gateway socket client. Inbound channel events are consumed by
//! the gateway's relay loop.

mod address;
mod connector;
mod wasocket;

pub use address::{normalize_address, ADDRESS_SUFFIX};
pub use connector::{
    ChannelConnector, ChannelEvent, CloseReason, ConnectivityState, InboundMessage, MessageBody,
    MessageId, SendError,
};
pub use wasocket::{WaSocket, CLOSE_CODE_LOGGED_OUT};
