//! Data models for the offline learning store.
//!
//! This module contains the record types persisted by the local store:
//!
//! - `Profile`: the single learner identity on this device
//! - `ContentItem`: a localized multiple-choice question
//! - `Attempt`: one submitted answer (immutable)
//! - `ProgressAggregate`: per-profile, per-category statistics derived from attempts
//! - `PendingOperation`: a queued state change awaiting remote delivery

pub mod attempt;
pub mod content;
pub mod profile;
pub mod progress;
pub mod queue;

pub use attempt::{Attempt, NewAttempt};
pub use content::{Category, ContentItem, Difficulty, Locale, LocalizedOptions, LocalizedText};
pub use profile::{NewProfile, Profile};
pub use progress::{Achievement, ProgressAggregate};
pub use queue::{OperationKind, PendingOperation};
