//! Realtime push of dispatch events to browser sessions.
//!
//! The [`RealtimeNotifier`] turns bus events into WebSocket messages. Push
//! is best-effort: a session that misses a message recovers through the
//! poll endpoints.

pub mod notifier;

pub use notifier::{operation_progress_message, workers_update_message, RealtimeNotifier};
