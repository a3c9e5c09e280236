//! Inbound stream frames.

use serde_json::Value;

use orderwire_core::protocol::{PONG, is_confirmation};

/// One order-status update as delivered to status subscribers.
///
/// The well-known fields are lifted out when present and of string type;
/// the full object is kept in [`raw`](Self::raw).
#[derive(Clone, Debug, PartialEq)]
pub struct StatusMessage {
    /// `user-id`
    pub user_id: Option<String>,
    /// `status-code`
    pub status_code: Option<String>,
    /// `order-status`
    pub order_status: Option<String>,
    /// `error-message`
    pub error_message: Option<String>,
    /// `orderData`
    pub order_data: Option<Value>,
    /// The frame as received.
    pub raw: Value,
}

impl StatusMessage {
    /// View over a decoded JSON object.
    pub fn from_value(raw: Value) -> Self {
        let text = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_owned);
        Self {
            user_id: text("user-id"),
            status_code: text("status-code"),
            order_status: text("order-status"),
            error_message: text("error-message"),
            order_data: raw.get("orderData").filter(|v| !v.is_null()).cloned(),
            raw,
        }
    }
}

/// Classification of a received text frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Inbound {
    /// Keepalive reply.
    Pong,
    /// Connection-confirmation sentinel.
    Confirmation,
    /// Order-status update.
    Status(StatusMessage),
    /// Not a JSON object.
    Malformed(String),
}

/// Classify a text frame.
pub fn parse_inbound(text: &str) -> Inbound {
    if text.trim() == PONG {
        return Inbound::Pong;
    }
    match serde_json::from_str::<Value>(text) {
        Ok(value) if value.is_object() => {
            if is_confirmation(&value) {
                Inbound::Confirmation
            } else {
                Inbound::Status(StatusMessage::from_value(value))
            }
        }
        Ok(_) => Inbound::Malformed("frame is not a JSON object".into()),
        Err(e) => Inbound::Malformed(e.to_string()),
    }
}
