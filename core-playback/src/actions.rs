//! Deferred action queue.
//!
//! Commands that arrive before their prerequisite is satisfied (load
//! completion, device resume) are captured as closures keyed by
//! `(event, action id)` and replayed exactly once when the prerequisite
//! event fires. Re-adding a key replaces the stored closure, so a burst of
//! commands for the same target collapses to the newest one.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

type ActionFn = Arc<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

struct ActionEntry {
    id: String,
    keep: bool,
    action: ActionFn,
}

/// Keyed registry of deferred async callbacks.
///
/// Within one event bucket, actions run in the order their keys were first
/// added; order across buckets is unspecified and callers must not rely on
/// it. One instance is owned per engine.
#[derive(Default)]
pub struct ActionQueue {
    buckets: Mutex<HashMap<String, Vec<ActionEntry>>>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `f` under `(event, id)`. An existing entry for the same key is
    /// replaced in place, keeping its position in the bucket.
    ///
    /// With `keep = false` the action is discarded after it runs once.
    pub fn add<F, Fut>(&self, event: &str, id: &str, keep: bool, f: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: ActionFn = Arc::new(move || Box::pin(f()) as BoxFuture<'static, ()>);
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(event.to_string()).or_default();
        match bucket.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.keep = keep;
                entry.action = action;
            }
            None => bucket.push(ActionEntry {
                id: id.to_string(),
                keep,
                action,
            }),
        }
    }

    /// Run every action under `event` in insertion order, discarding the
    /// run-once entries before the first action executes. Actions added while
    /// the bucket is being run are not part of this pass.
    pub async fn run(&self, event: &str) {
        let to_run: Vec<ActionFn> = {
            let mut buckets = self.buckets.lock();
            match buckets.get_mut(event) {
                Some(bucket) => {
                    let actions = bucket.iter().map(|e| Arc::clone(&e.action)).collect();
                    bucket.retain(|e| e.keep);
                    if bucket.is_empty() {
                        buckets.remove(event);
                    }
                    actions
                }
                None => Vec::new(),
            }
        };
        for action in to_run {
            action().await;
        }
    }

    /// Run the single action under `(event, id)`. Returns `false` when no
    /// such action exists.
    pub async fn run_one(&self, event: &str, id: &str) -> bool {
        let action = {
            let mut buckets = self.buckets.lock();
            match buckets.get_mut(event) {
                Some(bucket) => match bucket.iter().position(|e| e.id == id) {
                    Some(index) => {
                        let action = Arc::clone(&bucket[index].action);
                        if !bucket[index].keep {
                            bucket.remove(index);
                            if bucket.is_empty() {
                                buckets.remove(event);
                            }
                        }
                        Some(action)
                    }
                    None => None,
                },
                None => None,
            }
        };
        match action {
            Some(action) => {
                action().await;
                true
            }
            None => false,
        }
    }

    /// Drop the action under `(event, id)`, or the whole bucket when `id` is
    /// `None`. Removing something absent is a no-op.
    pub fn remove(&self, event: &str, id: Option<&str>) {
        let mut buckets = self.buckets.lock();
        match id {
            Some(id) => {
                if let Some(bucket) = buckets.get_mut(event) {
                    bucket.retain(|e| e.id != id);
                    if bucket.is_empty() {
                        buckets.remove(event);
                    }
                }
            }
            None => {
                buckets.remove(event);
            }
        }
    }

    /// Drop every stored action.
    pub fn clear(&self) {
        self.buckets.lock().clear();
    }

    pub fn contains(&self, event: &str, id: &str) -> bool {
        self.buckets
            .lock()
            .get(event)
            .map(|b| b.iter().any(|e| e.id == id))
            .unwrap_or(false)
    }

    /// Number of actions stored under `event`.
    pub fn len(&self, event: &str) -> usize {
        self.buckets.lock().get(event).map(Vec::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.lock().is_empty()
    }
}

impl fmt::Debug for ActionQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.buckets.lock();
        f.debug_struct("ActionQueue")
            .field("events", &buckets.len())
            .finish()
    }
}
