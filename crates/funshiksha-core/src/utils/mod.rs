//! Utility functions for identifiers and display formatting.

pub mod format;
pub mod ids;

pub use format::{age_display, truncate_string};
pub use ids::generate_id;
