use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Locale;

/// One submitted answer. Attempts are never updated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attempt {
    pub id: String,
    pub profile_id: String,
    pub content_id: String,
    pub selected_option: usize,
    /// Derived from the content item's correct option when the attempt is recorded
    pub is_correct: bool,
    pub time_spent_secs: u64,
    pub attempted_at: DateTime<Utc>,
    pub locale: Locale,
}

/// Caller-supplied fields for an answer submission. Correctness, id and
/// timestamp are filled in by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAttempt {
    pub profile_id: String,
    pub content_id: String,
    pub selected_option: usize,
    pub time_spent_secs: u64,
    pub locale: Locale,
}
