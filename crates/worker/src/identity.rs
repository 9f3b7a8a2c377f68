//! Stable worker identity: `<hostname>-<8 hex chars>`.
//!
//! The suffix is derived from the machine id so two machines sharing a
//! hostname still get distinct client ids, and one machine keeps its id
//! across restarts.

use std::path::Path;

use sha2::{Digest, Sha256};

const MACHINE_ID_PATHS: [&str; 2] = ["/etc/machine-id", "/var/lib/dbus/machine-id"];

/// Longest hostname part kept; leaves room for the suffix within the
/// server's client-id limit.
const MAX_HOST_LEN: usize = 64;

/// Detect this machine's client id.
pub fn detect_client_id() -> String {
    let hostname = detect_hostname();
    let machine_id = MACHINE_ID_PATHS
        .iter()
        .find_map(|p| read_trimmed(Path::new(p)))
        .unwrap_or_else(|| {
            tracing::warn!("No machine id found, deriving client id from hostname only");
            hostname.clone()
        });
    client_id_from(&hostname, &machine_id)
}

/// Build a client id from a hostname and a machine id.
pub fn client_id_from(hostname: &str, machine_id: &str) -> String {
    let digest = Sha256::digest(machine_id.as_bytes());
    let suffix: String = digest[..4].iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{suffix}", sanitize_hostname(hostname))
}

/// Lowercase, replace characters the server rejects with `-`, and trim.
fn sanitize_hostname(hostname: &str) -> String {
    let cleaned: String = hostname
        .trim()
        .to_ascii_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '-'
            }
        })
        .take(MAX_HOST_LEN)
        .collect();
    let cleaned = cleaned.trim_matches('-');
    if cleaned.is_empty() {
        "worker".to_string()
    } else {
        cleaned.to_string()
    }
}

fn detect_hostname() -> String {
    ["HOSTNAME", "COMPUTERNAME"]
        .iter()
        .find_map(|var| std::env::var(var).ok().filter(|v| !v.trim().is_empty()))
        .or_else(|| read_trimmed(Path::new("/etc/hostname")))
        .unwrap_or_else(|| "worker".to_string())
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
