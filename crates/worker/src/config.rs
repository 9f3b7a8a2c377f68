use std::path::PathBuf;
use std::time::Duration;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the savesync server, e.g. `http://host:3000`.
    pub server_url: String,
    /// Overrides the derived client id.
    pub client_id: Option<String>,
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Minimum spacing between progress reports of one operation.
    pub progress_min_interval: Duration,
    /// Root directory of the local transport's stored saves.
    pub storage_dir: PathBuf,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                    | Required | Default           |
    /// |----------------------------|----------|-------------------|
    /// | `SERVER_URL`               | **yes**  | --                |
    /// | `CLIENT_ID`                | no       | derived           |
    /// | `POLL_INTERVAL_SECS`       | no       | `3`               |
    /// | `HEARTBEAT_INTERVAL_SECS`  | no       | `5`               |
    /// | `PROGRESS_MIN_INTERVAL_MS` | no       | `500`             |
    /// | `SAVE_STORAGE_DIR`         | no       | `./save-storage`  |
    ///
    /// # Panics
    ///
    /// Panics if `SERVER_URL` is missing or a numeric value does not parse.
    pub fn from_env() -> Self {
        let server_url = std::env::var("SERVER_URL")
            .expect("SERVER_URL must be set in the environment")
            .trim_end_matches('/')
            .to_string();

        let client_id = std::env::var("CLIENT_ID")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let poll_interval = Duration::from_secs(
            std::env::var("POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "3".into())
                .parse()
                .expect("POLL_INTERVAL_SECS must be a valid u64"),
        );
        let heartbeat_interval = Duration::from_secs(
            std::env::var("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or_else(|_| "5".into())
                .parse()
                .expect("HEARTBEAT_INTERVAL_SECS must be a valid u64"),
        );
        let progress_min_interval = Duration::from_millis(
            std::env::var("PROGRESS_MIN_INTERVAL_MS")
                .unwrap_or_else(|_| "500".into())
                .parse()
                .expect("PROGRESS_MIN_INTERVAL_MS must be a valid u64"),
        );
        let storage_dir = std::env::var("SAVE_STORAGE_DIR")
            .unwrap_or_else(|_| "./save-storage".into())
            .into();

        Self {
            server_url,
            client_id,
            poll_interval,
            heartbeat_interval,
            progress_min_interval,
            storage_dir,
        }
    }
}
