//! Domain types and pure logic for the savesync dispatch subsystem.
//!
//! Nothing in this crate performs I/O. The store, event and HTTP layers
//! build on these types.

pub mod batch;
pub mod clock;
pub mod error;
pub mod messages;
pub mod operation;
pub mod presence;
pub mod roles;
pub mod types;
