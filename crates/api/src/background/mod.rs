//! Background loops.
//!
//! Each submodule provides a long-running async function intended to be
//! spawned via `tokio::spawn`. All of them accept a [`CancellationToken`]
//! for graceful shutdown and keep running after a failed iteration.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

pub mod operation_cleanup;
pub mod presence_monitor;
pub mod timeout_sweep;
