//! WebSocket push channel.
//!
//! Connection registry, heartbeat pings, and the HTTP upgrade handler. What
//! gets pushed is decided by [`crate::notifications`].

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
