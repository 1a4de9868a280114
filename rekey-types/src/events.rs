//! Operator-facing events recorded against cluster objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reason attached to a failed rotation step
pub const REASON_UPDATE_ERROR: &str = "update-error";
/// Reason attached to periodic migration progress
pub const REASON_PROGRESS: &str = "progress";
/// Reason attached to the end of a migration pass
pub const REASON_UPDATE_COMPLETE: &str = "update-complete";

/// Event severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Normal,
    Warning,
}

/// An event recorded against an object (the involved node)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier
    pub event_id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Name of the object the event is about
    pub involved_object: String,

    pub kind: EventKind,

    pub reason: String,

    pub message: String,
}

impl Event {
    /// Create a new event
    pub fn new(
        involved_object: impl Into<String>,
        kind: EventKind,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            involved_object: involved_object.into(),
            kind,
            reason: reason.into(),
            message: message.into(),
        }
    }

    pub fn warning(involved_object: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(involved_object, EventKind::Warning, REASON_UPDATE_ERROR, message)
    }

    pub fn progress(involved_object: impl Into<String>, count: usize) -> Self {
        Self::new(
            involved_object,
            EventKind::Normal,
            REASON_PROGRESS,
            format!("reencrypted {} secrets", count),
        )
    }

    pub fn complete(involved_object: impl Into<String>, count: usize) -> Self {
        Self::new(
            involved_object,
            EventKind::Normal,
            REASON_UPDATE_COMPLETE,
            format!("completed reencrypt of {} secrets", count),
        )
    }
}
