/// Integer primary keys used by the auth subsystem.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Identity of a user as issued by the auth subsystem.
pub type UserId = DbId;

/// Stable worker identifier (hostname plus hardware-derived suffix).
pub type ClientId = String;

/// Opaque operation token (UUID v7, time-ordered).
pub type OperationId = uuid::Uuid;

/// Groups sibling operations created by one multi-path action.
pub type BatchId = uuid::Uuid;
