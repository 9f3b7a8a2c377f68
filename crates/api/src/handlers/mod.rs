pub mod operations;
pub mod workers;
