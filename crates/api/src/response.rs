//! Shared response envelope for API handlers.

use serde::Serialize;

/// Standard `{ "data": ... }` envelope used by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct DataResponse<T: Serialize> {
    pub data: T,
}
