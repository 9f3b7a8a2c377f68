//! Operation kinds, statuses, progress, and the transition rules.
//!
//! The lifecycle is `pending -> in_progress -> {completed, failed}` with
//! `pending -> failed` also allowed. Terminal states are final and an
//! operation never re-enters `pending`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Error recorded by the watchdog sweep. Distinguishes "we never heard
/// back" from failures reported by a worker.
pub const TIMEOUT_ERROR: &str = "timeout";

/// Error attributed to a batch member that no longer exists in the store.
pub const MISSING_ERROR: &str = "missing";

/// Prefix applied to worker-reported errors that collide with a
/// server-assigned error.
const WORKER_ERROR_PREFIX: &str = "worker: ";

/// Maximum length of a custom operation kind.
const MAX_KIND_LEN: usize = 64;

/// Maximum length of a progress message.
const MAX_PROGRESS_MESSAGE_LEN: usize = 512;

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

/// Normalize an error reported by a worker for storage.
///
/// [`TIMEOUT_ERROR`] and [`MISSING_ERROR`] are reserved for the server, so a
/// worker reporting either verbatim gets it prefixed. Batch summaries can
/// then tell a watchdog timeout from a worker that happened to say so.
pub fn worker_error(error: &str) -> String {
    let error = error.trim();
    if error == TIMEOUT_ERROR || error == MISSING_ERROR {
        format!("{WORKER_ERROR_PREFIX}{error}")
    } else {
        error.to_string()
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of an operation.
///
/// Discriminants match the seed order of the `operation_statuses` table.
#[repr(i16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Pending = 1,
    InProgress = 2,
    Completed = 3,
    Failed = 4,
}

impl OperationStatus {
    /// Return the database status ID.
    pub fn id(self) -> StatusId {
        self as StatusId
    }

    /// Map a database status ID back to the enum.
    pub fn from_id(id: StatusId) -> Option<Self> {
        match id {
            1 => Some(Self::Pending),
            2 => Some(Self::InProgress),
            3 => Some(Self::Completed),
            4 => Some(Self::Failed),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether `self -> next` is a legal one-way transition.
    pub fn can_transition_to(self, next: OperationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::Pending, Self::Failed)
                | (Self::InProgress, Self::Completed)
                | (Self::InProgress, Self::Failed)
        )
    }
}

impl From<OperationStatus> for StatusId {
    fn from(value: OperationStatus) -> Self {
        value as StatusId
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Kind
// ---------------------------------------------------------------------------

/// What the worker is asked to do. Serialized as a snake_case string;
/// unknown but well-formed names are kept as [`OperationKind::Custom`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum OperationKind {
    Save,
    Load,
    Delete,
    BackupAll,
    DeleteAll,
    DeleteOneSave,
    UserDelete,
    GuestUpgrade,
    Custom(String),
}

impl OperationKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Save => "save",
            Self::Load => "load",
            Self::Delete => "delete",
            Self::BackupAll => "backup_all",
            Self::DeleteAll => "delete_all",
            Self::DeleteOneSave => "delete_one_save",
            Self::UserDelete => "user_delete",
            Self::GuestUpgrade => "guest_upgrade",
            Self::Custom(name) => name,
        }
    }
}

impl FromStr for OperationKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            "save" => Self::Save,
            "load" => Self::Load,
            "delete" => Self::Delete,
            "backup_all" => Self::BackupAll,
            "delete_all" => Self::DeleteAll,
            "delete_one_save" => Self::DeleteOneSave,
            "user_delete" => Self::UserDelete,
            "guest_upgrade" => Self::GuestUpgrade,
            other => {
                validate_custom_kind(other)?;
                Self::Custom(other.to_string())
            }
        };
        Ok(kind)
    }
}

impl TryFrom<String> for OperationKind {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<OperationKind> for String {
    fn from(value: OperationKind) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom kinds: 1..=64 chars of lowercase ascii, digits, or underscore.
fn validate_custom_kind(name: &str) -> Result<(), CoreError> {
    if name.is_empty() {
        return Err(CoreError::Validation(
            "Operation kind must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_KIND_LEN {
        return Err(CoreError::Validation(format!(
            "Operation kind must not exceed {MAX_KIND_LEN} characters"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(CoreError::Validation(format!(
            "Operation kind \"{name}\" may only contain lowercase letters, digits, or underscores"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress
// ---------------------------------------------------------------------------

/// Latest progress report of an in-flight operation, in files or bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub current: i64,
    pub total: i64,
    #[serde(default)]
    pub message: String,
}

impl Progress {
    /// Build a validated progress report.
    ///
    /// `current` may exceed `total` (parallel sub-transfers can report out
    /// of order); consumers clamp when computing percentages.
    pub fn new(current: i64, total: i64, message: impl Into<String>) -> Result<Self, CoreError> {
        if current < 0 || total < 0 {
            return Err(CoreError::Validation(
                "Progress current and total must not be negative".to_string(),
            ));
        }
        let message = message.into();
        if message.len() > MAX_PROGRESS_MESSAGE_LEN {
            return Err(CoreError::Validation(format!(
                "Progress message must not exceed {MAX_PROGRESS_MESSAGE_LEN} characters"
            )));
        }
        Ok(Self {
            current,
            total,
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OperationStatus; 4] = [
        OperationStatus::Pending,
        OperationStatus::InProgress,
        OperationStatus::Completed,
        OperationStatus::Failed,
    ];

    #[test]
    fn status_ids_round_trip() {
        for status in ALL {
            assert_eq!(OperationStatus::from_id(status.id()), Some(status));
        }
        assert_eq!(OperationStatus::from_id(0), None);
        assert_eq!(OperationStatus::from_id(5), None);
    }

    #[test]
    fn nothing_transitions_back_to_pending() {
        for from in ALL {
            assert!(!from.can_transition_to(OperationStatus::Pending));
        }
    }

    #[test]
    fn terminal_states_are_final() {
        for to in ALL {
            assert!(!OperationStatus::Completed.can_transition_to(to));
            assert!(!OperationStatus::Failed.can_transition_to(to));
        }
    }

    #[test]
    fn pending_may_fail_without_starting() {
        assert!(OperationStatus::Pending.can_transition_to(OperationStatus::Failed));
        assert!(!OperationStatus::Pending.can_transition_to(OperationStatus::Completed));
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&OperationStatus::InProgress).unwrap();
        assert_eq!(json, "\"in_progress\"");
    }

    #[test]
    fn known_kinds_parse() {
        assert_eq!("backup_all".parse::<OperationKind>().unwrap(), OperationKind::BackupAll);
        assert_eq!(
            "guest_upgrade".parse::<OperationKind>().unwrap(),
            OperationKind::GuestUpgrade
        );
    }

    #[test]
    fn unknown_kind_is_kept_as_custom() {
        let kind: OperationKind = serde_json::from_str("\"sync_screenshots\"").unwrap();
        assert_eq!(kind, OperationKind::Custom("sync_screenshots".to_string()));
        assert_eq!(serde_json::to_string(&kind).unwrap(), "\"sync_screenshots\"");
    }

    #[test]
    fn malformed_kind_rejected() {
        assert!("Save Game".parse::<OperationKind>().is_err());
        assert!("".parse::<OperationKind>().is_err());
        assert!(serde_json::from_str::<OperationKind>("\"../etc\"").is_err());
    }

    #[test]
    fn negative_progress_rejected() {
        assert!(Progress::new(-1, 10, "").is_err());
        assert!(Progress::new(1, -10, "").is_err());
        assert!(Progress::new(11, 10, "overshoot").is_ok());
    }

    #[test]
    fn reserved_errors_are_prefixed() {
        assert_eq!(worker_error("timeout"), "worker: timeout");
        assert_eq!(worker_error(" missing "), "worker: missing");
        assert_eq!(worker_error("disk full"), "disk full");
        assert_eq!(worker_error("Timeout"), "Timeout");
    }
}
