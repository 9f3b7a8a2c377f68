//! Savesync dispatch event bus.
//!
//! - [`EventBus`] -- in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`.
//! - [`DispatchEvent`] -- presence and operation changes published by the
//!   dispatch core and consumed by the realtime notifier.

pub mod bus;

pub use bus::{DispatchEvent, EventBus, OperationUpdate};
