use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::{Participant, RoomInfo, RoomStatus};

/// Client -> server events. One tagged union, one dispatch point per
/// connection; signaling payloads stay opaque `serde_json::Value`s.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
    },
    LeaveRoom {
        room_id: String,
    },
    ChatMessage {
        room_id: String,
        text: String,
    },
    TypingStart {
        room_id: String,
    },
    TypingStop {
        room_id: String,
    },
    WebrtcOffer {
        room_id: String,
        offer: serde_json::Value,
        target_conn_id: String,
    },
    WebrtcAnswer {
        room_id: String,
        answer: serde_json::Value,
        target_conn_id: String,
    },
    WebrtcIceCandidate {
        room_id: String,
        candidate: serde_json::Value,
        target_conn_id: String,
    },
    RoomStatusUpdated {
        room_id: String,
        status: String,
    },
}

/// Server -> client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    RoomJoined {
        room: RoomInfo,
        participants: Vec<Participant>,
    },
    ParticipantArrived {
        identity: String,
        username: String,
        conn_id: String,
    },
    ParticipantDeparted {
        identity: String,
        username: String,
    },
    ChatMessage {
        identity: String,
        username: String,
        text: String,
        server_timestamp: DateTime<Utc>,
    },
    UserTyping {
        identity: String,
        username: String,
    },
    UserStoppedTyping {
        identity: String,
    },
    WebrtcOffer {
        offer: serde_json::Value,
        sender_conn_id: String,
        sender_identity: String,
        sender_username: String,
    },
    WebrtcAnswer {
        answer: serde_json::Value,
        sender_conn_id: String,
        sender_identity: String,
        sender_username: String,
    },
    WebrtcIceCandidate {
        candidate: serde_json::Value,
        sender_conn_id: String,
        sender_identity: String,
    },
    RoomStatusUpdated {
        status: RoomStatus,
    },
    ParticipantDepartedByDisconnect {
        identity: String,
        username: String,
    },
    Error {
        code: u16,
        message: String,
    },
}

impl ServerEvent {
    pub fn error(err: &AppError) -> Self {
        ServerEvent::Error {
            code: err.ws_code(),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_events_use_kebab_tags_and_camel_fields() {
        let json = r#"{"event":"join-room","roomId":"r-1"}"#;
        let ev: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(ev, ClientEvent::JoinRoom { room_id } if room_id == "r-1"));

        let json = r#"{
            "event": "webrtc-ice-candidate",
            "roomId": "r-1",
            "candidate": {"candidate": "candidate:1", "sdpMid": "0", "sdpMLineIndex": 0},
            "targetConnId": "conn-9"
        }"#;
        let ev: ClientEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(ev, ClientEvent::WebrtcIceCandidate { .. }));
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let json = r#"{"event":"self-destruct","roomId":"r-1"}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn server_chat_event_serializes_timestamp() {
        let ev = ServerEvent::ChatMessage {
            identity: "u1".into(),
            username: "alice".into(),
            text: "hi".into(),
            server_timestamp: Utc::now(),
        };

        let value = serde_json::to_value(&ev).unwrap();
        assert_eq!(value["event"], "chat-message");
        assert_eq!(value["identity"], "u1");
        assert!(value["serverTimestamp"].is_string());
    }

    #[test]
    fn error_event_carries_taxonomy_code() {
        let ev = ServerEvent::error(&AppError::NotMember("u1 is not a member".into()));
        match ev {
            ServerEvent::Error { code, .. } => assert_eq!(code, 403),
            other => panic!("unexpected event: {:?}", other),
        }
    }
}
