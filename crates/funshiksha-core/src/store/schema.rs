//! Schema versioning and the migration hook.
//!
//! The persisted `meta.json` holds a single schema version. Opening a store
//! whose version is behind [`SCHEMA_VERSION`] runs the registered migrations
//! one step at a time before any record is served. A gap in the migration
//! chain, or a failing step, is fatal for that store.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Family, StoreError};

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Contents of `meta.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct StoreMeta {
    pub schema_version: u32,
}

/// Raw records of every family, as seen by migrations.
#[derive(Debug, Default)]
pub struct StoreData {
    families: HashMap<Family, BTreeMap<String, Value>>,
}

impl StoreData {
    pub fn records(&self, family: Family) -> Option<&BTreeMap<String, Value>> {
        self.families.get(&family)
    }

    pub fn records_mut(&mut self, family: Family) -> &mut BTreeMap<String, Value> {
        self.families.entry(family).or_default()
    }

    pub(crate) fn insert_family(&mut self, family: Family, records: BTreeMap<String, Value>) {
        self.families.insert(family, records);
    }
}

/// One upgrade step from `from` to `from + 1`.
#[derive(Clone)]
pub struct Migration {
    pub from: u32,
    pub description: &'static str,
    pub apply: fn(&mut StoreData) -> Result<(), String>,
}

impl std::fmt::Debug for Migration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migration")
            .field("from", &self.from)
            .field("description", &self.description)
            .finish()
    }
}

/// Target version plus the migration chain that reaches it.
#[derive(Debug, Clone)]
pub struct Schema {
    pub version: u32,
    pub migrations: Vec<Migration>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            version: SCHEMA_VERSION,
            migrations: vec![Migration {
                from: 0,
                description: "create record families",
                apply: create_families,
            }],
        }
    }
}

fn create_families(data: &mut StoreData) -> Result<(), String> {
    for family in Family::ALL {
        data.records_mut(family);
    }
    Ok(())
}

impl Schema {
    /// Bring `data` from `current` up to this schema's version.
    /// Returns the number of steps that ran.
    pub fn upgrade(&self, current: u32, data: &mut StoreData) -> Result<u32, StoreError> {
        if current > self.version {
            return Err(StoreError::UnsupportedVersion {
                found: current,
                supported: self.version,
            });
        }

        let mut version = current;
        while version < self.version {
            let step = self
                .migrations
                .iter()
                .find(|m| m.from == version)
                .ok_or(StoreError::MissingMigration {
                    from: version,
                    target: self.version,
                })?;
            tracing::info!(from = version, step = step.description, "Running store migration");
            (step.apply)(data).map_err(|reason| StoreError::MigrationFailed {
                from: version,
                reason,
            })?;
            version += 1;
        }
        Ok(version - current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_store_runs_initial_migration() {
        let mut data = StoreData::default();
        let steps = Schema::default().upgrade(0, &mut data).unwrap();
        assert_eq!(steps, 1);
        assert!(data.records(Family::Queue).is_some());
    }

    #[test]
    fn test_up_to_date_store_runs_nothing() {
        let mut data = StoreData::default();
        assert_eq!(Schema::default().upgrade(SCHEMA_VERSION, &mut data).unwrap(), 0);
    }

    #[test]
    fn test_version_bump_without_migration_is_fatal() {
        let schema = Schema {
            version: 2,
            ..Schema::default()
        };
        let err = schema.upgrade(1, &mut StoreData::default()).unwrap_err();
        assert!(matches!(err, StoreError::MissingMigration { from: 1, target: 2 }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let err = Schema::default()
            .upgrade(SCHEMA_VERSION + 1, &mut StoreData::default())
            .unwrap_err();
        assert!(matches!(err, StoreError::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_failing_migration_surfaces() {
        let mut schema = Schema::default();
        schema.version = 2;
        schema.migrations.push(Migration {
            from: 1,
            description: "always fails",
            apply: |_| Err("disk full".to_string()),
        });
        let err = schema.upgrade(1, &mut StoreData::default()).unwrap_err();
        assert!(matches!(err, StoreError::MigrationFailed { from: 1, .. }));
    }
}
