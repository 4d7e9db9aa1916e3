//! Realtime side of the coordinator: presence, WebRTC signaling relay and
//! host-only room actions over a websocket.

pub mod guard;
pub mod messages;
pub mod presence;
pub mod relay;
pub mod socket;

pub use guard::HostGuard;
pub use messages::{ClientMessage, ConnectionId, ServerMessage};
pub use presence::{Binding, PresenceRegistry};
pub use relay::{Outbox, RoomBroadcaster, SignalingRelay};
pub use socket::ws_handler;
