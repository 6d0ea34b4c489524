use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of state change waiting to be delivered to the remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationKind {
    #[serde(rename = "quiz_attempt")]
    AttemptSubmission,
    #[serde(rename = "progress_update")]
    ProgressUpdate,
    #[serde(rename = "user_update")]
    ProfileUpdate,
}

impl OperationKind {
    /// Wire name, also used as the remote path segment.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::AttemptSubmission => "quiz_attempt",
            OperationKind::ProgressUpdate => "progress_update",
            OperationKind::ProfileUpdate => "user_update",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued, not-yet-acknowledged state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: String,
    pub kind: OperationKind,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub retry_count: u32,
}

impl PendingOperation {
    /// Queue order: oldest first, ties broken by id.
    pub fn queue_order(a: &PendingOperation, b: &PendingOperation) -> std::cmp::Ordering {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_wire_names() {
        assert_eq!(
            serde_json::to_string(&OperationKind::AttemptSubmission).unwrap(),
            "\"quiz_attempt\""
        );
        let kind: OperationKind = serde_json::from_str("\"user_update\"").unwrap();
        assert_eq!(kind, OperationKind::ProfileUpdate);
        assert_eq!(OperationKind::ProgressUpdate.to_string(), "progress_update");
    }
}
