//! Worker presence constants, liveness math, and client-id validation.
//!
//! Liveness is never stored: `online` is derived at read time from the
//! last heartbeat and the configured timeout.

use chrono::Duration;

use crate::error::CoreError;
use crate::types::Timestamp;

/// A worker with no heartbeat for this many seconds is reported offline.
pub const DEFAULT_HEARTBEAT_TIMEOUT_SECS: u64 = 15;

/// How often the presence monitor looks for online -> offline flips.
pub const DEFAULT_PRESENCE_CHECK_INTERVAL_SECS: u64 = 5;

/// Unclaimed workers idle for this long are evicted from the store.
pub const DEFAULT_WORKER_EVICT_AFTER_SECS: u64 = 86_400;

/// Maximum length of a client id.
const MAX_CLIENT_ID_LEN: usize = 128;

/// Whether a worker last seen at `last_ping_at` counts as online at `now`.
pub fn is_online(last_ping_at: Timestamp, now: Timestamp, heartbeat_timeout: Duration) -> bool {
    now - last_ping_at < heartbeat_timeout
}

/// Validate a worker client id.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_CLIENT_ID_LEN` characters.
/// - Must contain only alphanumeric, hyphen, underscore, or dot characters.
pub fn validate_client_id(client_id: &str) -> Result<(), CoreError> {
    if client_id.is_empty() {
        return Err(CoreError::Validation(
            "client_id must not be empty".to_string(),
        ));
    }
    if client_id.len() > MAX_CLIENT_ID_LEN {
        return Err(CoreError::Validation(format!(
            "client_id must not exceed {MAX_CLIENT_ID_LEN} characters"
        )));
    }
    if !client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "client_id may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn online_strictly_inside_timeout() {
        let now = Utc::now();
        let timeout = Duration::seconds(15);
        assert!(is_online(now - Duration::seconds(14), now, timeout));
        assert!(!is_online(now - Duration::seconds(15), now, timeout));
        assert!(!is_online(now - Duration::seconds(60), now, timeout));
    }

    #[test]
    fn valid_client_id() {
        assert!(validate_client_id("gaming-pc.local-3fa9c2d1").is_ok());
    }

    #[test]
    fn empty_client_id_rejected() {
        assert!(validate_client_id("").is_err());
    }

    #[test]
    fn client_id_with_slash_rejected() {
        assert!(validate_client_id("host/../x").is_err());
    }

    #[test]
    fn client_id_too_long_rejected() {
        let id = "a".repeat(MAX_CLIENT_ID_LEN + 1);
        assert!(validate_client_id(&id).is_err());
    }
}
