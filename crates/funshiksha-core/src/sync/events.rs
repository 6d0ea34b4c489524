use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

use crate::events::{Message, Subscription};

/// Buffered messages per receiver before slow listeners start lagging.
const CHANNEL_CAPACITY: usize = 32;

/// Fan-out of sync messages to any number of listeners.
#[derive(Debug, Clone)]
pub struct SyncEvents {
    tx: broadcast::Sender<Message>,
}

impl SyncEvents {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Send to every current listener. Returns how many received it.
    pub fn publish(&self, message: Message) -> usize {
        debug!(?message, "Publishing sync message");
        self.tx.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.tx.subscribe()
    }

    /// Call `handler` with the remaining queue depth after every sync pass.
    /// Must be called from within a tokio runtime.
    pub fn on_sync_complete<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(usize) + Send + 'static,
    {
        let mut rx = self.subscribe();
        Subscription::new(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(Message::QuizSyncComplete { remaining }) => handler(remaining),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Sync listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }))
    }
}

impl Default for SyncEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_on_sync_complete_filters_messages() {
        let events = SyncEvents::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _subscription = events.on_sync_complete(move |remaining| {
            let _ = tx.send(remaining);
        });

        events.publish(Message::SkipWaiting);
        events.publish(Message::QuizSyncComplete { remaining: 3 });
        let seen = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(seen, Some(3));
    }

    #[test]
    fn test_publish_without_listeners() {
        assert_eq!(SyncEvents::new().publish(Message::SkipWaiting), 0);
    }
}
