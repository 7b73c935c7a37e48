// SPDX-License-Identifier: GPL-3.0-only

//! Capacity change fan-out
//!
//! Each subscriber owns a queue of capacity one. [`Watchers::notify`] offers
//! a token to every queue without blocking; a token already pending absorbs
//! the new one, so a subscriber learns that something changed, not how
//! often.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::trace;

/// Callback invoked after every successful mutation
pub type Notifier = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Registry {
    next_id: u64,
    channels: HashMap<u64, mpsc::Sender<()>>,
}

/// Registry of capacity watchers
#[derive(Clone, Default)]
pub struct Watchers {
    registry: Arc<Mutex<Registry>>,
}

impl Watchers {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self) -> Subscription {
        let (sender, receiver) = mpsc::channel(1);
        let mut registry = self.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.channels.insert(id, sender);
        trace!("Watcher {id} subscribed");

        Subscription {
            id,
            receiver,
            watchers: self.clone(),
        }
    }

    pub fn notify(&self) {
        for sender in self.lock().channels.values() {
            // Full means a wakeup is already pending.
            let _ = sender.try_send(());
        }
    }

    pub fn notifier(&self) -> Notifier {
        let watchers = self.clone();
        Arc::new(move || watchers.notify())
    }

    pub fn len(&self) -> usize {
        self.lock().channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unsubscribe(&self, id: u64) {
        self.lock().channels.remove(&id);
        trace!("Watcher {id} unsubscribed");
    }
}

/// Registration of one watcher; dropping it unregisters.
pub struct Subscription {
    id: u64,
    receiver: mpsc::Receiver<()>,
    watchers: Watchers,
}

impl Subscription {
    /// Wait for the next notification. Returns `false` once the registry can
    /// no longer deliver any.
    pub async fn changed(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.watchers.unsubscribe(self.id);
    }
}
