use std::fmt;

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::models::{Attempt, ContentItem, PendingOperation, Profile, ProgressAggregate};

/// The five record families owned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Family {
    Profiles,
    Content,
    Attempts,
    Progress,
    Queue,
}

/// A secondary lookup path: the named index matches on the listed JSON fields.
#[derive(Debug, Clone, Copy)]
pub struct IndexDef {
    pub name: &'static str,
    pub fields: &'static [&'static str],
}

const PROFILE_INDEXES: &[IndexDef] = &[
    IndexDef { name: "by-name", fields: &["name"] },
    IndexDef { name: "by-last-active", fields: &["last_active_at"] },
];

const CONTENT_INDEXES: &[IndexDef] = &[
    IndexDef { name: "by-category", fields: &["category"] },
    IndexDef { name: "by-difficulty", fields: &["difficulty"] },
    IndexDef { name: "by-category-difficulty", fields: &["category", "difficulty"] },
];

const ATTEMPT_INDEXES: &[IndexDef] = &[
    IndexDef { name: "by-profile", fields: &["profile_id"] },
    IndexDef { name: "by-content", fields: &["content_id"] },
    IndexDef { name: "by-profile-content", fields: &["profile_id", "content_id"] },
    IndexDef { name: "by-date", fields: &["attempted_at"] },
];

const PROGRESS_INDEXES: &[IndexDef] = &[
    IndexDef { name: "by-profile", fields: &["profile_id"] },
    IndexDef { name: "by-category", fields: &["category"] },
    IndexDef { name: "by-profile-category", fields: &["profile_id", "category"] },
];

const QUEUE_INDEXES: &[IndexDef] = &[
    IndexDef { name: "by-kind", fields: &["kind"] },
    IndexDef { name: "by-created-at", fields: &["created_at"] },
];

impl Family {
    pub const ALL: [Family; 5] = [
        Family::Profiles,
        Family::Content,
        Family::Attempts,
        Family::Progress,
        Family::Queue,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Family::Profiles => "profiles",
            Family::Content => "content",
            Family::Attempts => "attempts",
            Family::Progress => "progress",
            Family::Queue => "offline_queue",
        }
    }

    pub fn file_name(&self) -> String {
        format!("{}.json", self.name())
    }

    pub fn indexes(&self) -> &'static [IndexDef] {
        match self {
            Family::Profiles => PROFILE_INDEXES,
            Family::Content => CONTENT_INDEXES,
            Family::Attempts => ATTEMPT_INDEXES,
            Family::Progress => PROGRESS_INDEXES,
            Family::Queue => QUEUE_INDEXES,
        }
    }

    pub fn index(&self, name: &str) -> Option<&'static IndexDef> {
        self.indexes().iter().find(|idx| idx.name == name)
    }
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Value looked up through an index. Compound indexes take one component per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexKey(pub Vec<String>);

impl From<&str> for IndexKey {
    fn from(value: &str) -> Self {
        IndexKey(vec![value.to_string()])
    }
}

impl From<String> for IndexKey {
    fn from(value: String) -> Self {
        IndexKey(vec![value])
    }
}

impl From<(&str, &str)> for IndexKey {
    fn from((a, b): (&str, &str)) -> Self {
        IndexKey(vec![a.to_string(), b.to_string()])
    }
}

impl IndexDef {
    /// Extract this index's key from a stored record.
    pub fn key_of(&self, record: &Value) -> Option<IndexKey> {
        self.fields
            .iter()
            .map(|field| match record.get(field)? {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect::<Option<Vec<_>>>()
            .map(IndexKey)
    }
}

/// A type persisted in one of the store's families.
pub trait Record: Serialize + DeserializeOwned + Send + Sync {
    const FAMILY: Family;

    fn id(&self) -> &str;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl Record for Profile {
    const FAMILY: Family = Family::Profiles;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for ContentItem {
    const FAMILY: Family = Family::Content;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), String> {
        ContentItem::validate(self)
    }
}

impl Record for Attempt {
    const FAMILY: Family = Family::Attempts;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Record for ProgressAggregate {
    const FAMILY: Family = Family::Progress;

    fn id(&self) -> &str {
        &self.id
    }

    fn validate(&self) -> Result<(), String> {
        if self.correct_answers > self.total_questions {
            return Err(format!(
                "{}: {} correct out of {} questions",
                self.id, self.correct_answers, self.total_questions
            ));
        }
        Ok(())
    }
}

impl Record for PendingOperation {
    const FAMILY: Family = Family::Queue;

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compound_key_extraction() {
        let idx = Family::Progress.index("by-profile-category").unwrap();
        let record = json!({"profile_id": "user_1", "category": "math", "total_questions": 3});
        assert_eq!(idx.key_of(&record), Some(IndexKey::from(("user_1", "math"))));
    }

    #[test]
    fn test_missing_field_yields_no_key() {
        let idx = Family::Profiles.index("by-name").unwrap();
        assert_eq!(idx.key_of(&json!({"id": "x"})), None);
        assert_eq!(idx.key_of(&json!({"name": null})), None);
    }

    #[test]
    fn test_unknown_index() {
        assert!(Family::Queue.index("by-profile").is_none());
        assert!(Family::Queue.index("by-kind").is_some());
    }
}
