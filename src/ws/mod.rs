pub mod coordinator;
pub mod handler;
pub mod messages;
pub mod registry;
pub mod relay;

pub use coordinator::Coordinator;
pub use handler::ws_routes;
pub use messages::{ClientEvent, ServerEvent};
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use relay::SignalingRelay;
