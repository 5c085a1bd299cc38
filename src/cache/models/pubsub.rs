use serde_json::Value;

/// A message delivered to a channel handler.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelMessage {
    /// The payload parsed as JSON.
    Json(Value),
    /// The payload as published, when it is not JSON.
    Raw(String),
}

impl ChannelMessage {
    pub fn from_payload(payload: String) -> Self {
        match serde_json::from_str(&payload) {
            Ok(value) => ChannelMessage::Json(value),
            Err(_) => ChannelMessage::Raw(payload),
        }
    }
}
