//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod operation_repo;
pub mod worker_repo;

pub use operation_repo::OperationRepo;
pub use worker_repo::WorkerRepo;
