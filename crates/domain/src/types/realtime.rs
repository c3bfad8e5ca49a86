//! Wire messages for the broker channel and push connections

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message published on the shared broker channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BroadcastMessage {
    pub user_id: String,
    pub event: String,
    pub data: Value,
}

impl BroadcastMessage {
    /// Push-connection form of this message.
    pub fn into_push(self) -> PushMessage {
        PushMessage { event: self.event, data: Some(self.data) }
    }
}

/// Message exchanged with a live push connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl PushMessage {
    pub fn control(event: &str) -> Self {
        Self { event: event.to_string(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn broadcast_message_uses_camel_case() {
        let msg = BroadcastMessage {
            user_id: "u1".to_string(),
            event: "sync:status".to_string(),
            data: json!({"inSync": true}),
        };
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["userId"], "u1");

        let push = msg.into_push();
        assert_eq!(push.data, Some(json!({"inSync": true})));
    }

    #[test]
    fn broadcast_message_rejects_missing_fields() {
        assert!(serde_json::from_value::<BroadcastMessage>(json!({"event": "x"})).is_err());
        assert!(serde_json::from_value::<BroadcastMessage>(json!({
            "userId": "u", "event": "x", "data": null, "extra": 1
        }))
        .is_err());
    }

    #[test]
    fn control_messages_omit_data() {
        let text = serde_json::to_string(&PushMessage::control("ping")).unwrap();
        assert_eq!(text, r#"{"event":"ping"}"#);
    }
}
