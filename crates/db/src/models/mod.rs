//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - The domain entity returned by the stores
//! - A `FromRow` struct matching the database row where the two differ
//! - Insert / mutation DTOs

pub mod operation;
pub mod worker;
