//! Outbound synchronization of queued operations.
//!
//! - `Connectivity`: the shared online/offline flag
//! - `SyncEvents`: broadcast of completion messages to the presentation layer
//! - `RemoteEndpoint`: the seam to whatever accepts delivered operations
//! - `SyncCoordinator`: drains the persisted queue, one pass at a time

pub mod connectivity;
pub mod coordinator;
pub mod events;
pub mod remote;

pub use connectivity::Connectivity;
pub use coordinator::{SyncCoordinator, SyncOutcome, SyncReport, SyncStatus, DEFAULT_DELIVERY_TIMEOUT};
pub use events::SyncEvents;
pub use remote::{DeliveryError, RemoteEndpoint};
