//! Durable local record store.
//!
//! This module provides the `LocalStore`, which owns every persisted record
//! family: profiles, content items, attempts, progress aggregates and the
//! pending-operation queue. Records are kept as JSON, one file per family,
//! under a single store directory alongside a `meta.json` schema marker.
//!
//! Attempts are the source of truth for progress: aggregates are verified
//! against them (and rebuilt if needed) every time the store is opened.

pub mod error;
pub mod family;
pub mod local;
pub mod schema;
pub mod seed;

pub use error::StoreError;
pub use family::{Family, IndexDef, IndexKey, Record};
pub use local::LocalStore;
pub use schema::{Migration, Schema, StoreData, SCHEMA_VERSION};
pub use seed::default_content;
