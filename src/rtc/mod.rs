//! Client-side peer negotiation: one audio session per remote participant,
//! driven over the coordinator's signaling relay.

pub mod negotiator;
pub mod peer;
pub mod signal;

pub use negotiator::{initiates, Negotiator, NegotiatorConfig};
pub use peer::{LinkEvent, LinkState, PeerLink, Role};
pub use signal::SignalingChannel;
