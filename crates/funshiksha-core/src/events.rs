//! Messages exchanged between the cache interceptor, the sync coordinator
//! and the presentation layer.
//!
//! Messages are tagged JSON (`{"type": "QUIZ_SYNC_COMPLETE", ...}`) so they
//! can cross an execution-context boundary unchanged.

use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// A sync pass finished; `remaining` is the persisted queue depth afterwards.
    QuizSyncComplete {
        #[serde(default)]
        remaining: usize,
    },
    /// Ask an installed interceptor to activate without waiting.
    SkipWaiting,
}

impl Message {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Handle for a registered listener. The listener stops when this is dropped.
#[derive(Debug)]
pub struct Subscription {
    handle: JoinHandle<()>,
}

impl Subscription {
    pub(crate) fn new(handle: JoinHandle<()>) -> Self {
        Self { handle }
    }

    /// Stop the listener now.
    pub fn cancel(self) {
        self.handle.abort();
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let json = Message::QuizSyncComplete { remaining: 2 }.to_json().unwrap();
        assert_eq!(json, r#"{"type":"QUIZ_SYNC_COMPLETE","remaining":2}"#);
        assert_eq!(
            Message::from_json(r#"{"type":"SKIP_WAITING"}"#).unwrap(),
            Message::SkipWaiting
        );
        // Tag alone is enough to be recognized
        assert_eq!(
            Message::from_json(r#"{"type":"QUIZ_SYNC_COMPLETE"}"#).unwrap(),
            Message::QuizSyncComplete { remaining: 0 }
        );
    }
}
