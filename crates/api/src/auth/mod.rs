//! Token verification. Users and sessions are managed by the external auth
//! service; this server only validates the access tokens it issues.

pub mod jwt;
