use std::sync::Arc;

use serde_json::Value;

use crate::ws::registry::ConnectionRegistry;
use crate::ws::ServerEvent;

/// Stateless signaling pass-through. Payloads are never interpreted, only
/// checked for structural well-formedness; malformed or untargetable
/// messages are dropped silently. Absence of a response is the negotiation
/// client's signal, handled by its own timeout.
pub struct SignalingRelay {
    registry: Arc<ConnectionRegistry>,
}

impl SignalingRelay {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn relay_offer(&self, sender_conn_id: &str, target_conn_id: &str, offer: Value) {
        if !is_valid_session_description(&offer) {
            tracing::trace!(sender = %sender_conn_id, "Malformed offer dropped");
            return;
        }
        let Some(sender) = self.registry.lookup(sender_conn_id) else {
            return;
        };
        self.forward(
            target_conn_id,
            ServerEvent::WebrtcOffer {
                offer,
                sender_conn_id: sender.conn_id.clone(),
                sender_identity: sender.identity.clone(),
                sender_username: sender.username.clone(),
            },
        );
    }

    pub fn relay_answer(&self, sender_conn_id: &str, target_conn_id: &str, answer: Value) {
        if !is_valid_session_description(&answer) {
            tracing::trace!(sender = %sender_conn_id, "Malformed answer dropped");
            return;
        }
        let Some(sender) = self.registry.lookup(sender_conn_id) else {
            return;
        };
        self.forward(
            target_conn_id,
            ServerEvent::WebrtcAnswer {
                answer,
                sender_conn_id: sender.conn_id.clone(),
                sender_identity: sender.identity.clone(),
                sender_username: sender.username.clone(),
            },
        );
    }

    pub fn relay_candidate(&self, sender_conn_id: &str, target_conn_id: &str, candidate: Value) {
        if !is_valid_ice_candidate(&candidate) {
            tracing::trace!(sender = %sender_conn_id, "Malformed ICE candidate dropped");
            return;
        }
        let Some(sender) = self.registry.lookup(sender_conn_id) else {
            return;
        };
        self.forward(
            target_conn_id,
            ServerEvent::WebrtcIceCandidate {
                candidate,
                sender_conn_id: sender.conn_id.clone(),
                sender_identity: sender.identity.clone(),
            },
        );
    }

    /// No delivery guarantee: an unregistered target drops the message.
    fn forward(&self, target_conn_id: &str, event: ServerEvent) {
        if !self.registry.send_to(target_conn_id, event) {
            tracing::trace!(target = %target_conn_id, "Signaling target not registered, dropped");
        }
    }
}

/// An offer/answer needs a non-empty type + description pair.
pub fn is_valid_session_description(value: &Value) -> bool {
    let sdp_type = value.get("type").and_then(Value::as_str);
    let sdp = value.get("sdp").and_then(Value::as_str);

    matches!(sdp_type, Some("offer") | Some("answer")) && sdp.is_some_and(|s| !s.is_empty())
}

/// A candidate needs a non-empty candidate string plus its index fields.
pub fn is_valid_ice_candidate(value: &Value) -> bool {
    let candidate = value.get("candidate").and_then(Value::as_str);

    candidate.is_some_and(|c| !c.is_empty())
        && value.get("sdpMid").is_some_and(|v| !v.is_null())
        && value.get("sdpMLineIndex").is_some_and(|v| !v.is_null())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_description_validation() {
        assert!(is_valid_session_description(&json!({
            "type": "offer", "sdp": "v=0..."
        })));
        assert!(is_valid_session_description(&json!({
            "type": "answer", "sdp": "v=0..."
        })));

        assert!(!is_valid_session_description(&json!({
            "type": "offer", "sdp": ""
        })));
        assert!(!is_valid_session_description(&json!({
            "type": "rollback", "sdp": "v=0..."
        })));
        assert!(!is_valid_session_description(&json!({"sdp": "v=0..."})));
        assert!(!is_valid_session_description(&json!("offer")));
    }

    #[test]
    fn ice_candidate_validation() {
        assert!(is_valid_ice_candidate(&json!({
            "candidate": "candidate:842163049 1 udp 1677729535",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        })));

        assert!(!is_valid_ice_candidate(&json!({
            "candidate": "",
            "sdpMid": "0",
            "sdpMLineIndex": 0
        })));
        assert!(!is_valid_ice_candidate(&json!({
            "candidate": "candidate:1",
            "sdpMLineIndex": 0
        })));
        assert!(!is_valid_ice_candidate(&json!({
            "candidate": "candidate:1",
            "sdpMid": "0",
            "sdpMLineIndex": null
        })));
    }
}
