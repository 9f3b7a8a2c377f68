//! `savesync-worker` library crate.
//!
//! The worker process that executes dispatched operations on the machine
//! holding the save files. Modules are public so integration tests can
//! drive the poll loop against a real server.

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod progress;
pub mod runner;
pub mod transport;
