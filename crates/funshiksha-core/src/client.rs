//! Front-end facing entry points.
//!
//! `OfflineClient` pairs every local write with the matching queued
//! operation, so callers never have to remember to enqueue.

use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::models::{Attempt, ContentItem, NewAttempt, NewProfile, OperationKind, Profile};
use crate::store::{LocalStore, StoreError};
use crate::sync::{SyncCoordinator, SyncStatus};

#[derive(Clone)]
pub struct OfflineClient {
    store: Arc<LocalStore>,
    sync: SyncCoordinator,
}

impl OfflineClient {
    pub fn new(sync: SyncCoordinator) -> Self {
        Self {
            store: Arc::clone(sync.store()),
            sync,
        }
    }

    pub fn store(&self) -> &Arc<LocalStore> {
        &self.store
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.sync
    }

    /// Create the local profile and queue it for the remote.
    pub async fn create_profile(&self, new: NewProfile) -> Result<Profile, StoreError> {
        let profile = self.store.create_profile(new).await?;
        self.queue(OperationKind::ProfileUpdate, serde_json::to_value(&profile)?)
            .await;
        Ok(profile)
    }

    /// Record an answer locally and queue it for delivery.
    ///
    /// The attempt is durable once this returns, and its progress update is
    /// either written too or rebuilt from attempts on the next open.
    /// Failing to queue the submission is logged and not returned: the
    /// answer itself is safe, only its delivery is lost.
    pub async fn submit_answer(&self, new: NewAttempt) -> Result<Attempt, StoreError> {
        let attempt = self.store.record_attempt(new).await?;
        if let Err(e) = self.store.touch_profile(&attempt.profile_id).await {
            warn!(profile = %attempt.profile_id, error = %e, "Failed to update last active time");
        }

        let mut payload = serde_json::to_value(&attempt)?;
        if let Some(item) = self.store.get::<ContentItem>(&attempt.content_id).await? {
            if let Value::Object(ref mut fields) = payload {
                fields.insert("category".to_string(), Value::from(item.category.as_str()));
            }
        }
        self.queue(OperationKind::AttemptSubmission, payload).await;
        Ok(attempt)
    }

    async fn queue(&self, kind: OperationKind, payload: Value) {
        if let Err(e) = self.sync.enqueue(kind, payload).await {
            warn!(kind = %kind, error = %e, "Failed to add to offline queue");
        }
    }

    pub async fn status(&self) -> Result<SyncStatus, StoreError> {
        self.sync.status().await
    }
}
