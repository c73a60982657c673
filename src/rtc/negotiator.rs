use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{API, APIBuilder};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::track::track_local::TrackLocal;

use crate::error::Result;
use crate::models::RoomStatus;
use crate::rtc::peer::{LinkEvent, LinkState, PeerLink, Role};
use crate::ws::{ClientEvent, ServerEvent};

/// Candidates that arrive before their session exists are held here, per
/// sender, and flushed once the remote description lands.
const MAX_PENDING_CANDIDATES: usize = 16;

#[derive(Debug, Clone)]
pub struct NegotiatorConfig {
    pub room_id: String,
    pub local_conn_id: String,
    pub stun_servers: Vec<String>,
    pub turn_server: Option<String>,
    pub turn_username: Option<String>,
    pub turn_credential: Option<String>,
}

impl NegotiatorConfig {
    fn rtc_config(&self) -> RTCConfiguration {
        let mut ice_servers = Vec::new();

        if !self.stun_servers.is_empty() {
            ice_servers.push(RTCIceServer {
                urls: self.stun_servers.clone(),
                ..Default::default()
            });
        }

        if let Some(turn_server) = &self.turn_server {
            ice_servers.push(RTCIceServer {
                urls: vec![turn_server.clone()],
                username: self.turn_username.clone().unwrap_or_default(),
                credential: self.turn_credential.clone().unwrap_or_default(),
                ..Default::default()
            });
        }

        RTCConfiguration {
            ice_servers,
            ..Default::default()
        }
    }
}

/// Deterministic glare tie-break: when both sides initiate toward each
/// other, the lexicographically lower connection id stays the initiator.
pub fn initiates(local_conn_id: &str, remote_conn_id: &str) -> bool {
    local_conn_id < remote_conn_id
}

/// Client-side negotiation driver: one [`PeerLink`] per visible remote
/// participant, fed by the server event stream. Outbound signaling flows
/// through `signal_out`; media and state changes surface on `link_events`.
pub struct Negotiator {
    api: API,
    config: NegotiatorConfig,
    links: HashMap<String, PeerLink>,
    /// identity -> conn id for peers currently in the roster.
    roster: HashMap<String, String>,
    pending_candidates: HashMap<String, Vec<Value>>,
    local_tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
    audio_enabled: bool,
    room_live: bool,
    signal_out: mpsc::UnboundedSender<ClientEvent>,
    link_events: mpsc::UnboundedSender<LinkEvent>,
}

impl Negotiator {
    pub fn new(
        config: NegotiatorConfig,
        signal_out: mpsc::UnboundedSender<ClientEvent>,
        link_events: mpsc::UnboundedSender<LinkEvent>,
    ) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        Ok(Self {
            api,
            config,
            links: HashMap::new(),
            roster: HashMap::new(),
            pending_candidates: HashMap::new(),
            local_tracks: Vec::new(),
            audio_enabled: false,
            room_live: false,
            signal_out,
            link_events,
        })
    }

    /// Local audio became available: link every peer already visible.
    pub async fn enable_audio(
        &mut self,
        tracks: Vec<Arc<dyn TrackLocal + Send + Sync>>,
    ) -> Result<()> {
        self.local_tracks = tracks;
        self.audio_enabled = true;
        self.link_visible_peers().await;
        Ok(())
    }

    pub fn link_state(&self, remote_conn_id: &str) -> Option<LinkState> {
        self.links.get(remote_conn_id).map(|l| l.state())
    }

    pub fn active_link_count(&self) -> usize {
        self.links
            .values()
            .filter(|l| l.state() != LinkState::Closed)
            .count()
    }

    #[cfg(test)]
    pub(crate) fn pending_candidate_count(&self, remote_conn_id: &str) -> usize {
        self.pending_candidates
            .get(remote_conn_id)
            .map_or(0, Vec::len)
    }

    /// Feed one server event through the negotiation state machine.
    pub async fn handle_server_event(&mut self, event: &ServerEvent) -> Result<()> {
        match event {
            ServerEvent::RoomJoined { room, participants } => {
                self.room_live = room.status == RoomStatus::Live;
                self.roster.clear();
                for p in participants {
                    if let Some(conn_id) = &p.conn_id {
                        if *conn_id != self.config.local_conn_id {
                            self.roster.insert(p.identity.clone(), conn_id.clone());
                        }
                    }
                }
                self.link_visible_peers().await;
            }
            ServerEvent::ParticipantArrived {
                identity, conn_id, ..
            } => {
                self.roster.insert(identity.clone(), conn_id.clone());
                if let Err(e) = self.maybe_link(&conn_id.clone()).await {
                    tracing::warn!(remote_conn_id = %conn_id, error = %e, "Linking failed");
                }
            }
            ServerEvent::ParticipantDeparted { identity, .. }
            | ServerEvent::ParticipantDepartedByDisconnect { identity, .. } => {
                if let Some(conn_id) = self.roster.remove(identity) {
                    self.close_link(&conn_id).await;
                }
            }
            ServerEvent::RoomStatusUpdated { status } => {
                self.room_live = *status == RoomStatus::Live;
                if self.room_live {
                    self.link_visible_peers().await;
                }
            }
            ServerEvent::WebrtcOffer {
                offer,
                sender_conn_id,
                ..
            } => {
                self.on_offer(sender_conn_id, offer.clone()).await?;
            }
            ServerEvent::WebrtcAnswer {
                answer,
                sender_conn_id,
                ..
            } => {
                self.on_answer(sender_conn_id, answer.clone()).await?;
            }
            ServerEvent::WebrtcIceCandidate {
                candidate,
                sender_conn_id,
                ..
            } => {
                self.on_candidate(sender_conn_id, candidate.clone()).await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn link_visible_peers(&mut self) {
        let peers: Vec<String> = self.roster.values().cloned().collect();
        for conn_id in peers {
            if let Err(e) = self.maybe_link(&conn_id).await {
                tracing::warn!(remote_conn_id = %conn_id, error = %e, "Linking failed");
            }
        }
    }

    /// Decide to link with a visible peer: local audio enabled, peer in the
    /// roster, room Live. Creates the session in Offering and sends the
    /// offer; a fresh cycle for a peer is only allowed once the previous
    /// session reached Closed.
    async fn maybe_link(&mut self, remote_conn_id: &str) -> Result<()> {
        if !(self.audio_enabled && self.room_live) {
            return Ok(());
        }
        match self.links.get(remote_conn_id).map(|l| l.state()) {
            Some(LinkState::Closed) => {
                self.close_link(remote_conn_id).await;
            }
            Some(_) => return Ok(()),
            None => {}
        }

        let link = PeerLink::new(
            &self.api,
            self.config.rtc_config(),
            &self.config.room_id,
            remote_conn_id,
            Role::Initiator,
            &self.local_tracks,
            self.signal_out.clone(),
            self.link_events.clone(),
        )
        .await?;

        let offer = link.create_offer().await?;
        self.links.insert(remote_conn_id.to_string(), link);

        let _ = self.signal_out.send(ClientEvent::WebrtcOffer {
            room_id: self.config.room_id.clone(),
            offer,
            target_conn_id: remote_conn_id.to_string(),
        });

        tracing::debug!(remote_conn_id = %remote_conn_id, "Offer sent");
        Ok(())
    }

    async fn on_offer(&mut self, remote_conn_id: &str, offer: Value) -> Result<()> {
        match self.links.get(remote_conn_id).map(|l| l.state()) {
            None | Some(LinkState::Closed) => self.answer_offer(remote_conn_id, offer).await,
            Some(LinkState::Offering) => {
                // Glare: both sides initiated. The lower connection id keeps
                // its offer; the higher one abandons and answers.
                if initiates(&self.config.local_conn_id, remote_conn_id) {
                    tracing::debug!(remote_conn_id = %remote_conn_id, "Glare: remote offer dropped");
                    Ok(())
                } else {
                    tracing::debug!(remote_conn_id = %remote_conn_id, "Glare: yielding initiator role");
                    self.close_link(remote_conn_id).await;
                    self.answer_offer(remote_conn_id, offer).await
                }
            }
            Some(state) => {
                tracing::debug!(remote_conn_id = %remote_conn_id, state = ?state, "Offer in unexpected state, dropped");
                Ok(())
            }
        }
    }

    async fn answer_offer(&mut self, remote_conn_id: &str, offer: Value) -> Result<()> {
        if let Some(old) = self.links.remove(remote_conn_id) {
            old.close().await;
        }

        let link = PeerLink::new(
            &self.api,
            self.config.rtc_config(),
            &self.config.room_id,
            remote_conn_id,
            Role::Responder,
            &self.local_tracks,
            self.signal_out.clone(),
            self.link_events.clone(),
        )
        .await?;

        let answer = link.apply_offer(offer).await?;
        self.flush_pending(remote_conn_id, &link).await;
        self.links.insert(remote_conn_id.to_string(), link);

        let _ = self.signal_out.send(ClientEvent::WebrtcAnswer {
            room_id: self.config.room_id.clone(),
            answer,
            target_conn_id: remote_conn_id.to_string(),
        });

        tracing::debug!(remote_conn_id = %remote_conn_id, "Answer sent");
        Ok(())
    }

    async fn on_answer(&mut self, remote_conn_id: &str, answer: Value) -> Result<()> {
        let pending = self.pending_candidates.remove(remote_conn_id);
        match self.links.get(remote_conn_id) {
            Some(link) if link.state() == LinkState::Offering => {
                link.apply_answer(answer).await?;
                for candidate in pending.unwrap_or_default() {
                    if let Err(e) = link.add_candidate(candidate).await {
                        tracing::debug!(remote_conn_id = %remote_conn_id, error = %e, "Buffered candidate dropped");
                    }
                }
                Ok(())
            }
            _ => {
                if let Some(pending) = pending {
                    self.pending_candidates
                        .insert(remote_conn_id.to_string(), pending);
                }
                tracing::debug!(remote_conn_id = %remote_conn_id, "Answer without pending offer, dropped");
                Ok(())
            }
        }
    }

    async fn on_candidate(&mut self, remote_conn_id: &str, candidate: Value) {
        let applied = match self.links.get(remote_conn_id) {
            Some(link) if link.ready_for_candidates() => {
                match link.add_candidate(candidate.clone()).await {
                    Ok(()) => true,
                    Err(e) => {
                        tracing::debug!(remote_conn_id = %remote_conn_id, error = %e, "Candidate dropped");
                        true
                    }
                }
            }
            _ => false,
        };

        if !applied {
            self.buffer_candidate(remote_conn_id, candidate);
        }
    }

    fn buffer_candidate(&mut self, remote_conn_id: &str, candidate: Value) {
        let queue = self
            .pending_candidates
            .entry(remote_conn_id.to_string())
            .or_default();
        if queue.len() >= MAX_PENDING_CANDIDATES {
            queue.remove(0);
        }
        queue.push(candidate);
    }

    async fn flush_pending(&mut self, remote_conn_id: &str, link: &PeerLink) {
        for candidate in self
            .pending_candidates
            .remove(remote_conn_id)
            .unwrap_or_default()
        {
            if let Err(e) = link.add_candidate(candidate).await {
                tracing::debug!(remote_conn_id = %remote_conn_id, error = %e, "Buffered candidate dropped");
            }
        }
    }

    /// Connectivity failure or peer departure: release the session. A new
    /// cycle for the same peer is permitted afterwards.
    pub async fn close_link(&mut self, remote_conn_id: &str) {
        if let Some(link) = self.links.remove(remote_conn_id) {
            link.close().await;
        }
        self.pending_candidates.remove(remote_conn_id);
    }

    pub async fn close_all(&mut self) {
        let peers: Vec<String> = self.links.keys().cloned().collect();
        for conn_id in peers {
            self.close_link(&conn_id).await;
        }
        self.local_tracks.clear();
        self.audio_enabled = false;
    }
}
