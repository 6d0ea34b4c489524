//! Funshiksha core: the offline persistence and synchronization subsystem.
//!
//! This crate provides:
//! - `store`: the durable local record store (profiles, content, attempts,
//!   progress, pending-operation queue)
//! - `cache`: the request-interception cache with its install/activate lifecycle
//! - `sync`: the pending-operation queue drain and connectivity tracking
//! - `api`: the HTTP remote endpoint used to deliver queued operations
//!
//! Front-ends construct one [`LocalStore`] per process and hand it to every
//! component that needs it.

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod events;
pub mod models;
pub mod store;
pub mod sync;
pub mod utils;

pub use client::OfflineClient;
pub use config::Config;
pub use events::{Message, Subscription};
pub use store::{LocalStore, StoreError};
pub use sync::{Connectivity, SyncCoordinator, SyncEvents};
