//! Request coalescing for concurrent identical lookups.
//!
//! The first caller for a key becomes the owner and runs the work; callers
//! arriving while it is in flight subscribe to the owner's result slot and
//! receive a clone of whatever it produces. The entry is removed as soon as
//! the work settles, so nothing is remembered across calls.
//!
//! If the owner is dropped before publishing (its caller was cancelled), the
//! waiters race to register again and one of them takes over the work.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

type Slot<V> = watch::Receiver<Option<V>>;

/// Table of pending requests keyed by cache key.
#[derive(Debug)]
pub struct InFlight<V> {
    pending: Mutex<HashMap<String, Slot<V>>>,
}

impl<V> Default for InFlight<V> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
        }
    }
}

enum Role<V> {
    Owner(watch::Sender<Option<V>>),
    Waiter(Slot<V>),
}

/// Removes the owner's entry however the owner exits.
struct PendingGuard<'a, V> {
    table: &'a InFlight<V>,
    key: &'a str,
}

impl<V> Drop for PendingGuard<'_, V> {
    fn drop(&mut self) {
        self.table.lock().remove(self.key);
    }
}

impl<V> InFlight<V> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot<V>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of keys currently being worked on.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }
}

impl<V> InFlight<V>
where
    V: Clone,
{
    /// Join the run in flight for `key`, or register as its owner.
    ///
    /// A slot whose owner was dropped without publishing is replaced.
    fn join_or_register(&self, key: &str) -> Role<V> {
        let mut pending = self.lock();
        if let Some(slot) = pending.get(key) {
            let orphaned = slot.has_changed().is_err() && slot.borrow().is_none();
            if !orphaned {
                return Role::Waiter(slot.clone());
            }
        }
        let (tx, rx) = watch::channel(None);
        pending.insert(key.to_string(), rx);
        Role::Owner(tx)
    }

    /// Run `work` for `key`, or join the run already in flight.
    ///
    /// Lookup and registration happen under one lock, so at most one owner
    /// exists per key. `work` is only called if this caller ends up owning
    /// the key, either at once or after taking over from a cancelled owner.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V>,
    {
        let tx = loop {
            match self.join_or_register(key) {
                Role::Owner(tx) => break tx,
                Role::Waiter(mut rx) => {
                    debug!(key, "Joining in-flight request");
                    let settled = rx
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|slot| (*slot).clone());
                    if let Some(value) = settled {
                        return value;
                    }
                    debug!(key, "In-flight owner went away, taking over");
                }
            }
        };

        let guard = PendingGuard { table: self, key };
        let value = work().await;
        drop(guard);
        // Waiters hold receivers, so this wakes every one of them
        tx.send_replace(Some(value.clone()));
        value
    }
}
