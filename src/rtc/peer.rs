use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use webrtc::api::API;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

use crate::error::Result;
use crate::ws::ClientEvent;

/// Negotiation session state for one remote participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    /// Local side initiated; waiting for an answer.
    Offering,
    /// Local side responded to a remote offer.
    Answering,
    Connected,
    Closed,
}

/// Which side of the exchange this endpoint took for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Initiator,
    Responder,
}

/// Events surfaced to the application.
#[derive(Debug)]
pub enum LinkEvent {
    StateChanged {
        remote_conn_id: String,
        state: LinkState,
    },
    RemoteTrack {
        remote_conn_id: String,
        track: Arc<TrackRemote>,
    },
}

/// One negotiated audio session with a remote participant. Connected is
/// driven by connectivity signals from the underlying peer connection, not
/// by message receipt alone.
pub struct PeerLink {
    pub remote_conn_id: String,
    pub role: Role,
    pc: Arc<RTCPeerConnection>,
    state: Arc<watch::Sender<LinkState>>,
    remote_described: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<LinkEvent>,
}

impl PeerLink {
    pub async fn new(
        api: &API,
        config: RTCConfiguration,
        room_id: &str,
        remote_conn_id: &str,
        role: Role,
        local_tracks: &[Arc<dyn TrackLocal + Send + Sync>],
        signal_out: mpsc::UnboundedSender<ClientEvent>,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Self> {
        let pc = Arc::new(api.new_peer_connection(config).await?);

        for track in local_tracks {
            pc.add_track(Arc::clone(track)).await?;
        }

        let (state, _) = watch::channel(LinkState::Idle);
        let state = Arc::new(state);
        let remote_described = Arc::new(AtomicBool::new(false));

        // Local candidates go straight out through the relay; trickle, no
        // gathering barrier.
        {
            let signal_out = signal_out.clone();
            let room_id = room_id.to_string();
            let remote = remote_conn_id.to_string();
            pc.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
                let signal_out = signal_out.clone();
                let room_id = room_id.clone();
                let remote = remote.clone();
                Box::pin(async move {
                    let Some(candidate) = c else { return };
                    let Ok(init) = candidate.to_json() else { return };
                    let Ok(candidate) = serde_json::to_value(&init) else { return };
                    let _ = signal_out.send(ClientEvent::WebrtcIceCandidate {
                        room_id,
                        candidate,
                        target_conn_id: remote,
                    });
                })
            }));
        }

        // Inbound media surfaces to the application.
        {
            let events = events.clone();
            let remote = remote_conn_id.to_string();
            pc.on_track(Box::new(move |track, _receiver, _transceiver| {
                let events = events.clone();
                let remote = remote.clone();
                Box::pin(async move {
                    tracing::debug!(
                        remote_conn_id = %remote,
                        kind = ?track.kind(),
                        "Remote track received"
                    );
                    let _ = events.send(LinkEvent::RemoteTrack {
                        remote_conn_id: remote,
                        track,
                    });
                })
            }));
        }

        {
            let events = events.clone();
            let state = state.clone();
            let remote = remote_conn_id.to_string();
            pc.on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                let next = match s {
                    RTCPeerConnectionState::Connected => Some(LinkState::Connected),
                    RTCPeerConnectionState::Failed
                    | RTCPeerConnectionState::Disconnected
                    | RTCPeerConnectionState::Closed => Some(LinkState::Closed),
                    _ => None,
                };
                if let Some(next) = next {
                    if *state.borrow() != next {
                        state.send_replace(next);
                        let _ = events.send(LinkEvent::StateChanged {
                            remote_conn_id: remote.clone(),
                            state: next,
                        });
                    }
                }
                Box::pin(async {})
            }));
        }

        Ok(Self {
            remote_conn_id: remote_conn_id.to_string(),
            role,
            pc,
            state,
            remote_described,
            events,
        })
    }

    pub fn state(&self) -> LinkState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LinkState> {
        self.state.subscribe()
    }

    /// Candidates can only be applied once the remote description is in.
    pub fn ready_for_candidates(&self) -> bool {
        self.remote_described.load(Ordering::SeqCst)
    }

    /// Initiator path: produce and store a local offer.
    pub async fn create_offer(&self) -> Result<Value> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        self.set_state(LinkState::Offering);
        Ok(serde_json::to_value(&offer)?)
    }

    /// Responder path: apply the remote offer and produce an answer.
    pub async fn apply_offer(&self, offer: Value) -> Result<Value> {
        let desc: RTCSessionDescription = serde_json::from_value(offer)?;
        self.pc.set_remote_description(desc).await?;
        self.remote_described.store(true, Ordering::SeqCst);

        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        self.set_state(LinkState::Answering);
        Ok(serde_json::to_value(&answer)?)
    }

    /// Initiator path: apply the remote answer. The session stays in
    /// Offering until connectivity reports Connected.
    pub async fn apply_answer(&self, answer: Value) -> Result<()> {
        let desc: RTCSessionDescription = serde_json::from_value(answer)?;
        self.pc.set_remote_description(desc).await?;
        self.remote_described.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Apply a remote candidate. No state transition.
    pub async fn add_candidate(&self, candidate: Value) -> Result<()> {
        let init: RTCIceCandidateInit = serde_json::from_value(candidate)?;
        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    /// Tear down the session and release the underlying connection.
    pub async fn close(&self) {
        self.set_state(LinkState::Closed);
        if let Err(e) = self.pc.close().await {
            tracing::debug!(remote_conn_id = %self.remote_conn_id, error = %e, "Close failed");
        }
    }

    fn set_state(&self, next: LinkState) {
        if *self.state.borrow() != next {
            self.state.send_replace(next);
            let _ = self.events.send(LinkEvent::StateChanged {
                remote_conn_id: self.remote_conn_id.clone(),
                state: next,
            });
        }
    }
}
