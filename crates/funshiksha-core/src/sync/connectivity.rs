use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::events::Subscription;

/// Shared online/offline flag. Clones observe the same state.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Update the flag. Listeners are only notified on an actual change;
    /// returns whether one happened.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            info!(online, "Connectivity changed");
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Call `handler` with the new state on every change.
    /// Must be called from within a tokio runtime.
    pub fn on_change<F>(&self, mut handler: F) -> Subscription
    where
        F: FnMut(bool) + Send + 'static,
    {
        let mut rx = self.subscribe();
        Subscription::new(tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let online = *rx.borrow_and_update();
                handler(online);
            }
        }))
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
