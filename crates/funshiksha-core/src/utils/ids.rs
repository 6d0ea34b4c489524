use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Per-process counter so ids created in the same millisecond still sort
/// in creation order.
static ID_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Length of the random suffix that keeps ids unique across restarts.
const RANDOM_SUFFIX_LEN: usize = 9;

/// Generate an opaque record id of the form `{prefix}_{millis}_{seq}_{random}`.
pub fn generate_id(prefix: &str) -> String {
    let millis = Utc::now().timestamp_millis();
    let seq = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_SUFFIX_LEN)
        .map(|c| char::from(c).to_ascii_lowercase())
        .collect();
    format!("{}_{:013}_{:06}_{}", prefix, millis, seq % 1_000_000, suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_id_prefix_and_uniqueness() {
        let a = generate_id("queue");
        let b = generate_id("queue");
        assert!(a.starts_with("queue_"));
        assert_ne!(a, b);
        assert_eq!(a.split('_').count(), 4);
    }

    #[test]
    fn test_generate_id_sorts_in_creation_order() {
        let ids: Vec<String> = (0..50).map(|_| generate_id("attempt")).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
