use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::schema::{StoreData, StoreMeta};
use super::{Family, IndexKey, Record, Schema, StoreError};
use crate::models::{
    Attempt, Category, ContentItem, Difficulty, NewAttempt, NewProfile, OperationKind,
    PendingOperation, Profile, ProgressAggregate,
};
use crate::utils::generate_id;

/// Schema marker file name in the store directory
const META_FILE: &str = "meta.json";

/// Loaded records, keyed by primary id within each family.
#[derive(Debug, Default)]
struct StoreState {
    families: HashMap<Family, BTreeMap<String, Value>>,
}

impl StoreState {
    fn family(&self, family: Family) -> Option<&BTreeMap<String, Value>> {
        self.families.get(&family)
    }

    fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        self.family(R::FAMILY)
            .and_then(|records| records.get(id))
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(StoreError::from)
    }

    fn all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        self.family(R::FAMILY)
            .map(|records| {
                records
                    .values()
                    .map(|v| serde_json::from_value(v.clone()))
                    .collect::<Result<Vec<R>, _>>()
            })
            .transpose()
            .map(Option::unwrap_or_default)
            .map_err(StoreError::from)
    }
}

/// The process-wide record store.
///
/// Construct one per process and share it (`Arc<LocalStore>`). Every
/// operation initializes the store on first use; `initialize` may also be
/// called explicitly to surface open/migration failures at startup.
/// Writes are serialized through an async mutex and each family file is
/// replaced atomically (write to a temp file, then rename).
pub struct LocalStore {
    dir: PathBuf,
    schema: Schema,
    state: Mutex<Option<StoreState>>,
}

impl LocalStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self::with_schema(dir, Schema::default())
    }

    pub fn with_schema(dir: impl Into<PathBuf>, schema: Schema) -> Self {
        Self {
            dir: dir.into(),
            schema,
            state: Mutex::new(None),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Open the medium, run pending migrations and repair derived progress.
    /// Idempotent: later calls return immediately.
    pub async fn initialize(&self) -> Result<(), StoreError> {
        self.lock().await.map(|_| ())
    }

    async fn lock(&self) -> Result<MappedMutexGuard<'_, StoreState>, StoreError> {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            let state = self.open().await.inspect_err(|e| {
                error!(dir = %self.dir.display(), error = %e, "Failed to open local store");
            })?;
            *guard = Some(state);
        }
        Ok(MutexGuard::map(guard, |state| {
            state.get_or_insert_with(StoreState::default)
        }))
    }

    async fn open(&self) -> Result<StoreState, StoreError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::unavailable(&self.dir, e))?;

        let meta_path = self.dir.join(META_FILE);
        let version = match read_optional(&meta_path).await? {
            Some(contents) => {
                let meta: StoreMeta = serde_json::from_str(&contents)
                    .map_err(|e| StoreError::unavailable(&meta_path, e))?;
                meta.schema_version
            }
            None => 0,
        };

        let mut data = StoreData::default();
        for family in Family::ALL {
            let path = self.dir.join(family.file_name());
            if let Some(contents) = read_optional(&path).await? {
                let records: BTreeMap<String, Value> = serde_json::from_str(&contents)
                    .map_err(|e| StoreError::unavailable(&path, e))?;
                data.insert_family(family, records);
            }
        }

        let steps = self.schema.upgrade(version, &mut data)?;

        let mut state = StoreState::default();
        for family in Family::ALL {
            let records = data.records_mut(family);
            state.families.insert(family, std::mem::take(records));
        }

        if steps > 0 {
            for family in Family::ALL {
                self.persist(&state, family).await?;
            }
            let meta = StoreMeta {
                schema_version: self.schema.version,
            };
            write_atomic(&meta_path, &meta).await?;
            info!(
                from = version,
                to = self.schema.version,
                "Local store schema upgraded"
            );
        }

        let repaired = self.repair_progress(&mut state).await?;
        if repaired > 0 {
            warn!(repaired, "Rebuilt progress aggregates that disagreed with attempts");
        }

        debug!(dir = %self.dir.display(), version = self.schema.version, "Local store ready");
        Ok(state)
    }

    async fn persist(&self, state: &StoreState, family: Family) -> Result<(), StoreError> {
        let empty = BTreeMap::new();
        let records = state.family(family).unwrap_or(&empty);
        write_atomic(&self.dir.join(family.file_name()), records).await
    }

    /// Copy of one family's records to change before committing.
    fn staged(state: &StoreState, family: Family) -> BTreeMap<String, Value> {
        state.family(family).cloned().unwrap_or_default()
    }

    /// Write `records` as the new contents of `family`, then make them visible.
    /// A failed write leaves `state` untouched.
    async fn commit(
        &self,
        state: &mut StoreState,
        family: Family,
        records: BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        write_atomic(&self.dir.join(family.file_name()), &records).await?;
        state.families.insert(family, records);
        Ok(())
    }

    fn stage<R: Record>(
        records: &mut BTreeMap<String, Value>,
        record: &R,
    ) -> Result<(), StoreError> {
        record.validate().map_err(|reason| StoreError::InvalidRecord {
            family: R::FAMILY,
            reason,
        })?;
        let value = serde_json::to_value(record)?;
        records.insert(record.id().to_string(), value);
        Ok(())
    }

    // ===== Generic record operations =====

    pub async fn get<R: Record>(&self, id: &str) -> Result<Option<R>, StoreError> {
        self.lock().await?.get(id)
    }

    /// Insert or replace a record.
    ///
    /// Attempts can only be added, never replaced. Progress aggregates are
    /// owned by `record_attempt` and `recompute_progress` and are refused here.
    pub async fn put<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        if R::FAMILY == Family::Progress {
            return Err(StoreError::ProtectedFamily(R::FAMILY));
        }
        let mut state = self.lock().await?;
        let mut records = Self::staged(&state, R::FAMILY);
        if R::FAMILY == Family::Attempts && records.contains_key(record.id()) {
            return Err(StoreError::DuplicateRecord {
                family: R::FAMILY,
                id: record.id().to_string(),
            });
        }
        Self::stage(&mut records, record)?;
        self.commit(&mut state, R::FAMILY, records).await
    }

    /// Delete a record. Returns whether it existed.
    /// Attempts and progress aggregates cannot be deleted.
    pub async fn delete<R: Record>(&self, id: &str) -> Result<bool, StoreError> {
        if matches!(R::FAMILY, Family::Attempts | Family::Progress) {
            return Err(StoreError::ProtectedFamily(R::FAMILY));
        }
        let mut state = self.lock().await?;
        let mut records = Self::staged(&state, R::FAMILY);
        if records.remove(id).is_none() {
            return Ok(false);
        }
        self.commit(&mut state, R::FAMILY, records).await?;
        Ok(true)
    }

    pub async fn all<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        self.lock().await?.all()
    }

    pub async fn count(&self, family: Family) -> Result<usize, StoreError> {
        let state = self.lock().await?;
        Ok(state.family(family).map_or(0, BTreeMap::len))
    }

    /// Records whose `index` key equals `key`, ordered by primary id, at most `limit`.
    pub async fn query_by_index<R: Record>(
        &self,
        index: &str,
        key: impl Into<IndexKey>,
        limit: usize,
    ) -> Result<Vec<R>, StoreError> {
        let def = R::FAMILY
            .index(index)
            .ok_or_else(|| StoreError::UnknownIndex {
                family: R::FAMILY,
                index: index.to_string(),
            })?;
        let key = key.into();

        let state = self.lock().await?;
        let Some(records) = state.family(R::FAMILY) else {
            return Ok(Vec::new());
        };
        records
            .values()
            .filter(|value| def.key_of(value).as_ref() == Some(&key))
            .take(limit)
            .map(|value| serde_json::from_value(value.clone()).map_err(StoreError::from))
            .collect()
    }

    // ===== Content =====

    /// Insert `items` only if no content exists yet. Returns whether anything was inserted.
    pub async fn seed_if_empty(&self, items: &[ContentItem]) -> Result<bool, StoreError> {
        let mut state = self.lock().await?;
        if state.family(Family::Content).is_some_and(|c| !c.is_empty()) {
            debug!("Content already seeded");
            return Ok(false);
        }
        let mut records = BTreeMap::new();
        for item in items {
            Self::stage(&mut records, item)?;
        }
        self.commit(&mut state, Family::Content, records).await?;
        info!(count = items.len(), "Seeded content items");
        Ok(true)
    }

    pub async fn content_by_category(
        &self,
        category: Category,
        difficulty: Option<Difficulty>,
        limit: usize,
    ) -> Result<Vec<ContentItem>, StoreError> {
        match difficulty {
            Some(d) => {
                self.query_by_index(
                    "by-category-difficulty",
                    (category.as_str(), d.as_str()),
                    limit,
                )
                .await
            }
            None => {
                self.query_by_index("by-category", category.as_str(), limit)
                    .await
            }
        }
    }

    // ===== Profiles =====

    pub async fn create_profile(&self, new: NewProfile) -> Result<Profile, StoreError> {
        let now = Utc::now();
        let profile = Profile {
            id: generate_id("user"),
            name: new.name,
            class: new.class,
            school: new.school,
            preferred_locale: new.preferred_locale,
            created_at: now,
            last_active_at: now,
        };
        self.put(&profile).await?;
        Ok(profile)
    }

    pub async fn get_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        self.get(id).await
    }

    /// Bump a profile's last-active time. Returns `None` for unknown profiles.
    pub async fn touch_profile(&self, id: &str) -> Result<Option<Profile>, StoreError> {
        let mut state = self.lock().await?;
        let Some(mut profile) = state.get::<Profile>(id)? else {
            return Ok(None);
        };
        profile.touch(Utc::now());
        let mut records = Self::staged(&state, Family::Profiles);
        Self::stage(&mut records, &profile)?;
        self.commit(&mut state, Family::Profiles, records).await?;
        Ok(Some(profile))
    }

    // ===== Attempts and progress =====

    /// Record an answer and fold it into the (profile, category) aggregate.
    ///
    /// The attempt write is the commit point: if it fails nothing changes
    /// and the error is returned. The aggregate is written second. Should
    /// that write fail, the in-memory aggregate still advances and the file
    /// is rebuilt from attempts the next time the store is opened, the same
    /// as after a crash between the two writes.
    pub async fn record_attempt(&self, new: NewAttempt) -> Result<Attempt, StoreError> {
        let mut state = self.lock().await?;
        let item: ContentItem = state
            .get(&new.content_id)?
            .ok_or_else(|| StoreError::UnknownContentItem(new.content_id.clone()))?;
        if new.selected_option >= item.option_count() {
            return Err(StoreError::InvalidRecord {
                family: Family::Attempts,
                reason: format!(
                    "option {} out of range for {} ({} options)",
                    new.selected_option,
                    item.id,
                    item.option_count()
                ),
            });
        }

        let attempt = Attempt {
            id: generate_id("attempt"),
            is_correct: item.is_correct(new.selected_option),
            profile_id: new.profile_id,
            content_id: new.content_id,
            selected_option: new.selected_option,
            time_spent_secs: new.time_spent_secs,
            attempted_at: Utc::now(),
            locale: new.locale,
        };
        let aggregate_id = ProgressAggregate::aggregate_id(&attempt.profile_id, item.category);
        let mut progress = state
            .get::<ProgressAggregate>(&aggregate_id)?
            .unwrap_or_else(|| {
                ProgressAggregate::new(&attempt.profile_id, item.category, attempt.attempted_at)
            });
        progress.apply(
            attempt.is_correct,
            attempt.time_spent_secs,
            attempt.attempted_at,
        );

        let mut attempts = Self::staged(&state, Family::Attempts);
        Self::stage(&mut attempts, &attempt)?;
        let mut aggregates = Self::staged(&state, Family::Progress);
        Self::stage(&mut aggregates, &progress)?;

        self.commit(&mut state, Family::Attempts, attempts).await?;
        let progress_path = self.dir.join(Family::Progress.file_name());
        if let Err(e) = write_atomic(&progress_path, &aggregates).await {
            warn!(
                aggregate = %aggregate_id,
                error = %e,
                "Failed to write progress aggregate, it will be rebuilt on next open"
            );
        }
        state.families.insert(Family::Progress, aggregates);

        debug!(
            attempt = %attempt.id,
            content = %attempt.content_id,
            correct = attempt.is_correct,
            "Recorded attempt"
        );
        Ok(attempt)
    }

    pub async fn attempts_for_profile(
        &self,
        profile_id: &str,
        limit: usize,
    ) -> Result<Vec<Attempt>, StoreError> {
        self.query_by_index("by-profile", profile_id, limit).await
    }

    pub async fn progress_for_profile(
        &self,
        profile_id: &str,
    ) -> Result<Vec<ProgressAggregate>, StoreError> {
        self.query_by_index("by-profile", profile_id, usize::MAX)
            .await
    }

    /// Rebuild every aggregate of `profile_id` from its attempts.
    pub async fn recompute_progress(
        &self,
        profile_id: &str,
    ) -> Result<Vec<ProgressAggregate>, StoreError> {
        let mut state = self.lock().await?;
        let rebuilt: Vec<ProgressAggregate> = derive_progress(&state)?
            .into_values()
            .filter(|p| p.profile_id == profile_id)
            .collect();

        let mut records = Self::staged(&state, Family::Progress);
        records.retain(|_, v| v.get("profile_id").and_then(Value::as_str) != Some(profile_id));
        for aggregate in &rebuilt {
            Self::stage(&mut records, aggregate)?;
        }
        self.commit(&mut state, Family::Progress, records).await?;
        Ok(rebuilt)
    }

    /// Replace any aggregate that disagrees with its attempts. Returns how many changed.
    async fn repair_progress(&self, state: &mut StoreState) -> Result<usize, StoreError> {
        let derived = derive_progress(state)?;
        let mut records = Self::staged(state, Family::Progress);
        let mut repaired = 0;
        for (id, aggregate) in &derived {
            let stored: Option<ProgressAggregate> = state.get(id)?;
            if stored.as_ref() != Some(aggregate) {
                debug!(aggregate = %id, "Progress aggregate out of date");
                Self::stage(&mut records, aggregate)?;
                repaired += 1;
            }
        }
        if repaired > 0 {
            self.commit(state, Family::Progress, records).await?;
        }
        Ok(repaired)
    }

    // ===== Pending operation queue =====

    pub async fn add_pending(
        &self,
        kind: OperationKind,
        payload: Value,
    ) -> Result<PendingOperation, StoreError> {
        let op = PendingOperation {
            id: generate_id("queue"),
            kind,
            payload,
            created_at: Utc::now(),
            retry_count: 0,
        };
        self.put(&op).await?;
        Ok(op)
    }

    /// The queue in delivery order (oldest first).
    pub async fn list_pending(&self) -> Result<Vec<PendingOperation>, StoreError> {
        let mut queue: Vec<PendingOperation> = self.all().await?;
        queue.sort_by(PendingOperation::queue_order);
        Ok(queue)
    }

    pub async fn remove_pending(&self, id: &str) -> Result<bool, StoreError> {
        self.delete::<PendingOperation>(id).await
    }

    /// Increment an entry's retry count. Returns the new count, or `None` if it is gone.
    pub async fn mark_pending_failed(&self, id: &str) -> Result<Option<u32>, StoreError> {
        let mut state = self.lock().await?;
        let Some(mut op) = state.get::<PendingOperation>(id)? else {
            return Ok(None);
        };
        op.retry_count += 1;
        let mut records = Self::staged(&state, Family::Queue);
        Self::stage(&mut records, &op)?;
        self.commit(&mut state, Family::Queue, records).await?;
        Ok(Some(op.retry_count))
    }

    pub async fn pending_count(&self) -> Result<usize, StoreError> {
        self.count(Family::Queue).await
    }
}

/// Replay every attempt, oldest first, into fresh aggregates.
/// Attempts whose content item no longer exists are skipped.
fn derive_progress(state: &StoreState) -> Result<BTreeMap<String, ProgressAggregate>, StoreError> {
    let mut attempts: Vec<Attempt> = state.all()?;
    attempts.sort_by(|a, b| {
        a.attempted_at
            .cmp(&b.attempted_at)
            .then_with(|| a.id.cmp(&b.id))
    });

    let mut categories: HashMap<String, Option<Category>> = HashMap::new();
    let mut derived: BTreeMap<String, ProgressAggregate> = BTreeMap::new();
    for attempt in attempts {
        if !categories.contains_key(&attempt.content_id) {
            let category = state
                .get::<ContentItem>(&attempt.content_id)?
                .map(|item| item.category);
            categories.insert(attempt.content_id.clone(), category);
        }
        let Some(category) = categories.get(&attempt.content_id).copied().flatten() else {
            continue;
        };
        derived
            .entry(ProgressAggregate::aggregate_id(&attempt.profile_id, category))
            .or_insert_with(|| {
                ProgressAggregate::new(&attempt.profile_id, category, attempt.attempted_at)
            })
            .apply(
                attempt.is_correct,
                attempt.time_spent_secs,
                attempt.attempted_at,
            );
    }
    Ok(derived)
}

async fn read_optional(path: &Path) -> Result<Option<String>, StoreError> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(StoreError::unavailable(path, e)),
    }
}

/// Replace `path` with the JSON form of `value` via a temp file and rename.
async fn write_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    let contents = serde_json::to_string_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| StoreError::unavailable(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::unavailable(path, e))
}

// ============================================================================
// Tests
// ============================================================================
