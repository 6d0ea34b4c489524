use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Locale;

/// The learner profile for this device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    pub name: String,
    /// Cohort tag, e.g. "Class 6"
    pub class: String,
    pub school: Option<String>,
    pub preferred_locale: Locale,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
}

impl Profile {
    /// Record activity at `at`. Last-active never moves backwards.
    pub fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_active_at {
            self.last_active_at = at;
        }
    }
}

/// Fields supplied by the caller when creating a profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewProfile {
    pub name: String,
    pub class: String,
    pub school: Option<String>,
    pub preferred_locale: Locale,
}
