mod common;

use common::Harness;
use serde_json::json;
use voxroom::ws::ServerEvent;

#[tokio::test]
async fn offer_is_forwarded_with_sender_attribution() {
    let h = Harness::new();
    let _a = h.connect("conn-a", "u-a", "alice");
    let mut b = h.connect("conn-b", "u-b", "bob");

    h.relay.relay_offer(
        "conn-a",
        "conn-b",
        json!({"type": "offer", "sdp": "v=0\r\n..."}),
    );

    match b.next() {
        Some(ServerEvent::WebrtcOffer {
            sender_conn_id,
            sender_identity,
            offer,
            ..
        }) => {
            assert_eq!(sender_conn_id, "conn-a");
            assert_eq!(sender_identity, "u-a");
            assert_eq!(offer["type"], "offer");
        }
        other => panic!("expected webrtc-offer, got {:?}", other),
    }
}

#[tokio::test]
async fn candidate_round_trip_keeps_payload_opaque() {
    let h = Harness::new();
    let _a = h.connect("conn-a", "u-a", "alice");
    let mut b = h.connect("conn-b", "u-b", "bob");

    let candidate = json!({
        "candidate": "candidate:842163049 1 udp 1677729535 10.0.0.1 45678 typ srflx",
        "sdpMid": "0",
        "sdpMLineIndex": 0,
        "usernameFragment": "abcd"
    });
    h.relay
        .relay_candidate("conn-a", "conn-b", candidate.clone());

    match b.next() {
        Some(ServerEvent::WebrtcIceCandidate {
            candidate: forwarded,
            sender_conn_id,
            ..
        }) => {
            assert_eq!(forwarded, candidate);
            assert_eq!(sender_conn_id, "conn-a");
        }
        other => panic!("expected webrtc-ice-candidate, got {:?}", other),
    }
}

#[tokio::test]
async fn unregistered_target_drops_silently() {
    let h = Harness::new();
    let _a = h.connect("conn-a", "u-a", "alice");

    // No conn-b registered; nothing to assert beyond "no panic, no error".
    h.relay.relay_offer(
        "conn-a",
        "conn-b",
        json!({"type": "offer", "sdp": "v=0\r\n..."}),
    );
}

#[tokio::test]
async fn malformed_payloads_never_reach_the_target() {
    let h = Harness::new();
    let _a = h.connect("conn-a", "u-a", "alice");
    let mut b = h.connect("conn-b", "u-b", "bob");

    h.relay
        .relay_offer("conn-a", "conn-b", json!({"type": "offer", "sdp": ""}));
    h.relay
        .relay_answer("conn-a", "conn-b", json!({"sdp": "v=0"}));
    h.relay
        .relay_candidate("conn-a", "conn-b", json!({"candidate": ""}));

    assert!(b.next().is_none());
}
