//! Role names carried in access-token claims.

/// Administrators may trigger the kill-switch and release any claim.
pub const ROLE_ADMIN: &str = "admin";

/// Regular players.
pub const ROLE_USER: &str = "user";
