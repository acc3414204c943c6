// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Generation status types and the WebSocket wire protocol.
//!
//! Wire messages are tagged with `type` in snake_case; field names are
//! camelCase to match the dashboard clients.

pub mod bus;
pub mod registry;
pub mod ws;

use serde::{Deserialize, Serialize};

/// Lifecycle of one generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStatus {
    Pending,
    Processing,
    Complete,
    Error,
}

/// One progress update for a generation. Forwarded as published, never
/// mutated in flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationUpdate {
    pub generation_id: String,
    pub status: GenerationStatus,
    /// 0 to 100.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Epoch millis at publish time.
    pub timestamp: u64,
}

/// Messages sent by WS clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    #[serde(rename_all = "camelCase")]
    Subscribe { generation_id: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribe { generation_id: String },
    Pong,
}

/// Messages sent to WS clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    Connected { connection_id: String, timestamp: u64 },
    #[serde(rename_all = "camelCase")]
    Subscribed { generation_id: String },
    #[serde(rename_all = "camelCase")]
    Unsubscribed { generation_id: String },
    GenerationUpdate {
        #[serde(flatten)]
        update: GenerationUpdate,
    },
    Ping { timestamp: u64 },
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_serializes_with_camel_case_fields() {
        let msg = ServerMessage::GenerationUpdate {
            update: GenerationUpdate {
                generation_id: "gen-1".into(),
                status: GenerationStatus::Processing,
                progress: 40,
                audio_url: None,
                message: Some("rendering".into()),
                timestamp: 123,
            },
        };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).expect("ser")).expect("de");
        assert_eq!(json["type"], "generation_update");
        assert_eq!(json["generationId"], "gen-1");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progress"], 40);
        assert_eq!(json["message"], "rendering");
        assert!(json.get("audioUrl").is_none());
    }

    #[test]
    fn client_messages_parse() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","generationId":"gen-9"}"#).expect("parse");
        assert!(matches!(msg, ClientMessage::Subscribe { generation_id } if generation_id == "gen-9"));

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"pong"}"#).expect("parse");
        assert!(matches!(msg, ClientMessage::Pong));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"launch_missiles"}"#).is_err());
    }

    #[test]
    fn connected_greeting_shape() {
        let msg = ServerMessage::Connected { connection_id: "c-1".into(), timestamp: 5 };
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&msg).expect("ser")).expect("de");
        assert_eq!(json["type"], "connected");
        assert_eq!(json["connectionId"], "c-1");
    }
}
