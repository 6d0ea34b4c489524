use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::api::RemoteError;
use crate::models::PendingOperation;

/// Accepts delivered operations. One call per queued entry; `Ok` means the
/// remote has durably accepted it and the entry may be removed.
#[async_trait]
pub trait RemoteEndpoint: Send + Sync {
    async fn deliver(&self, op: &PendingOperation) -> Result<(), DeliveryError>;
}

#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("Delivery failed: {0}")]
    Failed(String),

    #[error("Delivery timed out after {0:?}")]
    TimedOut(Duration),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}
