//! Visitor-facing WebSocket protocol types.
//!
//! JSON frames tagged on `event`. Clients send `send_message`; the server
//! pushes `receive_message` and `error`.

use serde::{Deserialize, Serialize};

/// Display name stamped on operator replies delivered to visitors.
pub const OPERATOR_DISPLAY_NAME: &str = "Admin";

/// Client→server frame: `{ "event": "send_message", "text": ... }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VisitorCommand {
    SendMessage { text: String },
}

/// Server→client frame: `receive_message` or `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum VisitorEvent {
    ReceiveMessage { text: String, from: String },
    Error { message: String },
}

impl VisitorEvent {
    /// An operator reply, stamped with the operator display name.
    pub fn from_operator(text: impl Into<String>) -> Self {
        Self::ReceiveMessage {
            text: text.into(),
            from: OPERATOR_DISPLAY_NAME.to_string(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_message_frame_parses() {
        let cmd: VisitorCommand =
            serde_json::from_str(r#"{"event":"send_message","text":"hello"}"#).expect("parse");
        let VisitorCommand::SendMessage { text } = cmd;
        assert_eq!(text, "hello");
    }

    #[test]
    fn operator_reply_frame_shape() {
        let json = serde_json::to_value(VisitorEvent::from_operator("yes")).expect("serialize");
        assert_eq!(json["event"], "receive_message");
        assert_eq!(json["text"], "yes");
        assert_eq!(json["from"], "Admin");
    }

    #[test]
    fn error_frame_shape() {
        let json =
            serde_json::to_value(VisitorEvent::error("message not sent")).expect("serialize");
        assert_eq!(json["event"], "error");
        assert_eq!(json["message"], "message not sent");
    }
}
