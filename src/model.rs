//! Core data model.
//!
//! A work item is an integer payload tagged with the identifier handed back to
//! the caller. The identifier is the join key between the log record, the
//! status record and the result record.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Expiry applied to every status and result record at write time.
pub const STATUS_TTL: Duration = Duration::from_secs(60 * 60);

// ---------------------------------------------------------------------------
// Identifier
// ---------------------------------------------------------------------------

/// Newtype for submission identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkId(pub Uuid);

impl WorkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Store key holding the status of this submission.
    pub fn status_key(&self) -> String {
        format!("{}:status", self.0)
    }

    /// Store key holding the computed result of this submission.
    pub fn result_key(&self) -> String {
        format!("{}:result", self.0)
    }
}

impl Default for WorkId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Full hyphenated form: this string is the record key on the wire.
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for WorkId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(WorkId)
    }
}

// ---------------------------------------------------------------------------
// Work Item
// ---------------------------------------------------------------------------

/// A unit of work as it travels through the ingest topic.
///
/// On the log the identifier is the record key and the payload is the record
/// value; this struct is the decoded pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkItem {
    pub id: WorkId,
    pub payload: i64,
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Lifecycle status of a submission as seen by a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Accepted and queued, not yet processed.
    Dispatched,
    /// Computation complete, result available.
    Processed,
    /// Unknown, expired or malformed identifier. Never written to the store.
    Invalid,
}

impl Status {
    /// Map a raw store value to a status. Anything unrecognised, including a
    /// missing key, reads as `Invalid`.
    pub fn from_store(raw: Option<&str>) -> Self {
        match raw {
            Some("Dispatched") => Status::Dispatched,
            Some("Processed") => Status::Processed,
            _ => Status::Invalid,
        }
    }

    /// The value written to the store, if this status is ever persisted.
    pub fn as_store_value(self) -> Option<&'static str> {
        match self {
            Status::Dispatched => Some("Dispatched"),
            Status::Processed => Some("Processed"),
            Status::Invalid => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Dispatched => "Dispatched",
            Status::Processed => "Processed",
            Status::Invalid => "Invalid",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_layout_uses_hyphenated_uuid() {
        let id: WorkId = "6f1c2a34-9d7e-4b0a-8c55-0123456789ab".parse().unwrap();
        assert_eq!(id.status_key(), "6f1c2a34-9d7e-4b0a-8c55-0123456789ab:status");
        assert_eq!(id.result_key(), "6f1c2a34-9d7e-4b0a-8c55-0123456789ab:result");
    }

    #[test]
    fn unknown_store_values_read_as_invalid() {
        assert_eq!(Status::from_store(Some("Dispatched")), Status::Dispatched);
        assert_eq!(Status::from_store(Some("Processed")), Status::Processed);
        assert_eq!(Status::from_store(Some("processed")), Status::Invalid);
        assert_eq!(Status::from_store(Some("")), Status::Invalid);
        assert_eq!(Status::from_store(None), Status::Invalid);
    }

    #[test]
    fn invalid_is_never_persisted() {
        assert_eq!(Status::Invalid.as_store_value(), None);
        assert_eq!(Status::Dispatched.as_store_value(), Some("Dispatched"));
        assert_eq!(Status::Processed.as_store_value(), Some("Processed"));
    }
}
