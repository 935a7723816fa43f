//! Registry of live sound instances.
//!
//! Sounds are bucketed by resource and tagged with their owning group; the
//! façade layer holds only ids and looks handles up here, which keeps it free
//! of back-references into the engine. The idle sweep is re-entrancy guarded
//! and re-validates every candidate immediately before destroying it, so a
//! sound that started playing (or was marked persistent) mid-sweep survives.

use crate::ids::{GroupId, ResourceId, SoundId};
use crate::sound::{Sound, SoundState};
use bridge_traits::time::Clock;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Heap {
    clock: Arc<dyn Clock>,
    idle_threshold: Duration,
    buckets: Mutex<HashMap<ResourceId, Vec<Sound>>>,
    sweeping: AtomicBool,
}

impl Heap {
    pub fn new(clock: Arc<dyn Clock>, idle_threshold: Duration) -> Self {
        Self {
            clock,
            idle_threshold,
            buckets: Mutex::new(HashMap::new()),
            sweeping: AtomicBool::new(false),
        }
    }

    /// Register a sound under its resource bucket. Re-adding an id already
    /// present in the bucket is a no-op.
    pub fn add(&self, sound: Sound) {
        let resource = sound.resource();
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(resource).or_default();
        if bucket.iter().any(|s| s.id() == sound.id()) {
            return;
        }
        bucket.push(sound);
    }

    /// Look a live sound up by instance id.
    pub fn sound(&self, id: SoundId) -> Option<Sound> {
        self.buckets
            .lock()
            .values()
            .flatten()
            .find(|s| s.id() == id && s.state() != SoundState::Destroyed)
            .cloned()
    }

    /// Every live sound, optionally restricted to one group.
    pub fn sounds(&self, group: Option<&GroupId>) -> Vec<Sound> {
        self.buckets
            .lock()
            .values()
            .flatten()
            .filter(|s| s.state() != SoundState::Destroyed)
            .filter(|s| group.map(|g| &s.group() == g).unwrap_or(true))
            .cloned()
            .collect()
    }

    /// Destroy sounds, optionally restricted to one group.
    ///
    /// With `idle_only = true` only non-persistent, non-playing sounds idle
    /// past the threshold are destroyed; otherwise everything that matches
    /// the filter goes. Returns the number destroyed. Overlapping sweeps are
    /// rejected (return 0).
    pub fn free(&self, idle_only: bool, group: Option<&GroupId>) -> usize {
        if self
            .sweeping
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return 0;
        }

        let candidates: Vec<Sound> = {
            let buckets = self.buckets.lock();
            buckets
                .values()
                .flatten()
                .filter(|s| group.map(|g| &s.group() == g).unwrap_or(true))
                .cloned()
                .collect()
        };

        let mut destroyed = 0;
        let now = self.clock.monotonic();
        for sound in candidates {
            // Re-validate right before destroying: the sound may have been
            // played or pinned since the snapshot was taken.
            if idle_only && !sound.sweep_eligible(now, self.idle_threshold) {
                continue;
            }
            if sound.state() == SoundState::Destroyed {
                continue;
            }
            sound.destroy();
            destroyed += 1;
        }

        self.prune();
        if destroyed > 0 {
            debug!(destroyed, "heap sweep complete");
        }
        self.sweeping.store(false, Ordering::SeqCst);
        destroyed
    }

    /// Unconditionally destroy and clear everything. Shutdown only.
    pub fn destroy(&self) {
        let all: Vec<Sound> = {
            let mut buckets = self.buckets.lock();
            buckets.drain().flat_map(|(_, bucket)| bucket).collect()
        };
        for sound in all {
            sound.destroy();
        }
    }

    /// Drop destroyed entries and empty buckets.
    fn prune(&self) {
        let mut buckets = self.buckets.lock();
        for bucket in buckets.values_mut() {
            bucket.retain(|s| s.state() != SoundState::Destroyed);
        }
        buckets.retain(|_, bucket| !bucket.is_empty());
    }

    /// Number of live sounds across all buckets.
    pub fn len(&self) -> usize {
        self.buckets
            .lock()
            .values()
            .flatten()
            .filter(|s| s.state() != SoundState::Destroyed)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Heap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heap")
            .field("sounds", &self.len())
            .field("idle_threshold", &self.idle_threshold)
            .finish()
    }
}
