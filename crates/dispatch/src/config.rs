use std::time::Duration;

use savesync_core::presence::{
    DEFAULT_HEARTBEAT_TIMEOUT_SECS, DEFAULT_PRESENCE_CHECK_INTERVAL_SECS,
    DEFAULT_WORKER_EVICT_AFTER_SECS,
};

/// Timing and retention knobs for the dispatch services and their
/// background loops.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// A worker with no heartbeat for this long is reported offline.
    pub heartbeat_timeout: Duration,
    /// Non-terminal operations with no activity for this long are failed
    /// with the timeout sentinel.
    pub operation_timeout: Duration,
    pub sweep_interval: Duration,
    pub presence_check_interval: Duration,
    /// Unclaimed workers idle this long are deleted.
    pub worker_evict_after: Duration,
    /// When set, claimed workers idle this long are released. `None` keeps
    /// claims across any outage.
    pub claim_idle_expiry: Option<Duration>,
    /// Terminal operations are deleted this long after completion.
    pub operation_retention: Duration,
    pub cleanup_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout: Duration::from_secs(DEFAULT_HEARTBEAT_TIMEOUT_SECS),
            operation_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(30),
            presence_check_interval: Duration::from_secs(DEFAULT_PRESENCE_CHECK_INTERVAL_SECS),
            worker_evict_after: Duration::from_secs(DEFAULT_WORKER_EVICT_AFTER_SECS),
            claim_idle_expiry: None,
            operation_retention: Duration::from_secs(86_400),
            cleanup_interval: Duration::from_secs(3600),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default  |
    /// |--------------------------------|----------|
    /// | `HEARTBEAT_TIMEOUT_SECS`       | `15`     |
    /// | `OPERATION_TIMEOUT_SECS`       | `600`    |
    /// | `SWEEP_INTERVAL_SECS`          | `30`     |
    /// | `PRESENCE_CHECK_INTERVAL_SECS` | `5`      |
    /// | `WORKER_EVICT_AFTER_SECS`      | `86400`  |
    /// | `CLAIM_IDLE_EXPIRY_SECS`       | unset    |
    /// | `OPERATION_RETENTION_SECS`     | `86400`  |
    /// | `CLEANUP_INTERVAL_SECS`        | `3600`   |
    ///
    /// Panics on unparsable values so misconfiguration surfaces at startup.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            heartbeat_timeout: secs_from_env("HEARTBEAT_TIMEOUT_SECS", defaults.heartbeat_timeout),
            operation_timeout: secs_from_env("OPERATION_TIMEOUT_SECS", defaults.operation_timeout),
            sweep_interval: secs_from_env("SWEEP_INTERVAL_SECS", defaults.sweep_interval),
            presence_check_interval: secs_from_env(
                "PRESENCE_CHECK_INTERVAL_SECS",
                defaults.presence_check_interval,
            ),
            worker_evict_after: secs_from_env(
                "WORKER_EVICT_AFTER_SECS",
                defaults.worker_evict_after,
            ),
            claim_idle_expiry: std::env::var("CLAIM_IDLE_EXPIRY_SECS").ok().map(|v| {
                Duration::from_secs(
                    v.parse()
                        .expect("CLAIM_IDLE_EXPIRY_SECS must be a valid u64"),
                )
            }),
            operation_retention: secs_from_env(
                "OPERATION_RETENTION_SECS",
                defaults.operation_retention,
            ),
            cleanup_interval: secs_from_env("CLEANUP_INTERVAL_SECS", defaults.cleanup_interval),
        }
    }
}

fn secs_from_env(name: &str, default: Duration) -> Duration {
    match std::env::var(name) {
        Ok(v) => Duration::from_secs(
            v.parse()
                .unwrap_or_else(|_| panic!("{name} must be a valid u64")),
        ),
        Err(_) => default,
    }
}

/// Convert a configured duration for timestamp arithmetic. Saturates at
/// one century, which no sane configuration reaches.
pub(crate) fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or_else(|_| chrono::Duration::days(36_500))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = DispatchConfig::default();
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(15));
        assert_eq!(config.operation_timeout, Duration::from_secs(600));
        assert!(config.claim_idle_expiry.is_none());
    }

    #[test]
    fn chrono_conversion_saturates() {
        assert_eq!(to_chrono(Duration::from_secs(15)), chrono::Duration::seconds(15));
        assert_eq!(to_chrono(Duration::MAX), chrono::Duration::days(36_500));
    }
}
