use std::sync::Arc;

use crate::auth::AuthService;
use crate::config::Config;
use crate::directory::{RoomDirectory, RoomLocks};
use crate::ws::{ConnectionRegistry, Coordinator, SignalingRelay};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth: Arc<AuthService>,
    pub directory: Arc<dyn RoomDirectory>,
    pub room_locks: Arc<RoomLocks>,
    pub coordinator: Arc<Coordinator>,
    pub relay: Arc<SignalingRelay>,
}

impl AppState {
    pub fn new(config: Config, auth: AuthService, directory: Arc<dyn RoomDirectory>) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        let room_locks = Arc::new(RoomLocks::new());
        let coordinator = Arc::new(Coordinator::new(
            directory.clone(),
            registry.clone(),
            room_locks.clone(),
        ));
        let relay = Arc::new(SignalingRelay::new(registry));

        Self {
            config: Arc::new(config),
            auth: Arc::new(auth),
            directory,
            room_locks,
            coordinator,
            relay,
        }
    }
}
