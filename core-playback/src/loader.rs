//! Deduplicating resource loader.
//!
//! Turns resource identifiers into cached [`DecodedAudio`] via the bridge's
//! fetch and decode services. For a given identifier there is at most one
//! outstanding transfer at any time: concurrent requesters attach to the
//! in-flight waiter list and every one of them receives the same outcome.
//!
//! Failure is a value, never an error: [`load`](Loader::load) always resolves
//! with a [`LoadOutcome`], so a batch of N identifiers produces N results and
//! one bad resource never aborts its siblings.

use crate::ids::ResourceId;
use bridge_traits::audio::DecodedAudio;
use bridge_traits::decode::DecodeService;
use bridge_traits::fetch::MediaFetcher;
use core_runtime::events::{Emitter, EngineEvent, LoadEvent};
use futures::future::join_all;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Result of loading one resource. Inspect [`audio`](Self::audio) or
/// [`error`](Self::error); exactly one of them is set.
#[derive(Debug, Clone)]
pub struct LoadOutcome {
    pub resource: ResourceId,
    pub audio: Option<Arc<DecodedAudio>>,
    pub error: Option<String>,
}

impl LoadOutcome {
    fn ok(resource: ResourceId, audio: Arc<DecodedAudio>) -> Self {
        Self {
            resource,
            audio: Some(audio),
            error: None,
        }
    }

    fn failed(resource: ResourceId, error: impl Into<String>) -> Self {
        Self {
            resource,
            audio: None,
            error: Some(error.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.audio.is_some()
    }
}

#[derive(Default)]
struct LoaderState {
    cache: HashMap<ResourceId, Arc<DecodedAudio>>,
    in_flight: HashMap<ResourceId, Vec<oneshot::Sender<LoadOutcome>>>,
    disposed: bool,
}

/// Async downloader/decoder with a decode cache and single-flight transfers.
pub struct Loader {
    fetcher: Arc<dyn MediaFetcher>,
    decoder: Arc<dyn DecodeService>,
    emitter: Emitter,
    state: Mutex<LoaderState>,
}

impl Loader {
    pub fn new(
        fetcher: Arc<dyn MediaFetcher>,
        decoder: Arc<dyn DecodeService>,
        emitter: Emitter,
    ) -> Self {
        Self {
            fetcher,
            decoder,
            emitter,
            state: Mutex::new(LoaderState::default()),
        }
    }

    /// Load one resource, deduplicating against the cache and any in-flight
    /// transfer for the same identifier.
    pub async fn load(&self, resource: &ResourceId) -> LoadOutcome {
        enum Role {
            Done(LoadOutcome),
            Waiter(oneshot::Receiver<LoadOutcome>),
            Driver,
        }

        let role = {
            let mut state = self.state.lock();
            if state.disposed {
                Role::Done(LoadOutcome::failed(resource.clone(), "loader is disposed"))
            } else if let Some(audio) = state.cache.get(resource) {
                Role::Done(LoadOutcome::ok(resource.clone(), Arc::clone(audio)))
            } else if let Some(waiters) = state.in_flight.get_mut(resource) {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                Role::Waiter(rx)
            } else {
                state.in_flight.insert(resource.clone(), Vec::new());
                Role::Driver
            }
        };

        match role {
            Role::Done(outcome) => outcome,
            Role::Waiter(rx) => rx.await.unwrap_or_else(|_| {
                LoadOutcome::failed(resource.clone(), "loader is disposed")
            }),
            Role::Driver => self.drive_transfer(resource).await,
        }
    }

    /// Load a batch; one outcome per identifier, failures included.
    pub async fn load_many(&self, resources: &[ResourceId]) -> Vec<LoadOutcome> {
        join_all(resources.iter().map(|id| self.load(id))).await
    }

    /// The sole transfer for `resource`; resolves every attached waiter.
    async fn drive_transfer(&self, resource: &ResourceId) -> LoadOutcome {
        debug!(resource = %resource, "starting transfer");
        let decoded = match self.fetcher.fetch(resource.as_str()).await {
            Ok(bytes) => self.decoder.decode(bytes).await,
            Err(e) => Err(e),
        };

        let outcome = match decoded {
            Ok(audio) => {
                let audio = Arc::new(audio);
                let waiters = {
                    let mut state = self.state.lock();
                    if !state.disposed {
                        state.cache.insert(resource.clone(), Arc::clone(&audio));
                    }
                    state.in_flight.remove(resource).unwrap_or_default()
                };
                let outcome = LoadOutcome::ok(resource.clone(), audio);
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
                self.emitter.emit(EngineEvent::Load(LoadEvent::Loaded {
                    resource: resource.to_string(),
                }));
                outcome
            }
            Err(e) => {
                warn!(resource = %resource, error = %e, "load failed");
                let waiters = {
                    let mut state = self.state.lock();
                    state.in_flight.remove(resource).unwrap_or_default()
                };
                let outcome = LoadOutcome::failed(resource.clone(), e.to_string());
                for waiter in waiters {
                    let _ = waiter.send(outcome.clone());
                }
                self.emitter.emit(EngineEvent::Load(LoadEvent::Failed {
                    resource: resource.to_string(),
                    message: e.to_string(),
                }));
                outcome
            }
        };
        outcome
    }

    /// Cached decode for `resource`, if present.
    pub fn cached(&self, resource: &ResourceId) -> Option<Arc<DecodedAudio>> {
        self.state.lock().cache.get(resource).map(Arc::clone)
    }

    pub fn is_cached(&self, resource: &ResourceId) -> bool {
        self.state.lock().cache.contains_key(resource)
    }

    /// Evict cache entries. `None` clears the whole cache.
    pub fn unload(&self, resources: Option<&[ResourceId]>) {
        let mut state = self.state.lock();
        match resources {
            Some(ids) => {
                for id in ids {
                    state.cache.remove(id);
                }
            }
            None => state.cache.clear(),
        }
    }

    /// Idempotent. Clears the cache, fails any attached waiters, and marks
    /// the loader unusable.
    pub fn dispose(&self) {
        let in_flight = {
            let mut state = self.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            state.cache.clear();
            std::mem::take(&mut state.in_flight)
        };
        for (resource, waiters) in in_flight {
            for waiter in waiters {
                let _ = waiter.send(LoadOutcome::failed(
                    resource.clone(),
                    "loader is disposed",
                ));
            }
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Pick the first candidate codec the platform can decode.
    pub fn supported_format(
        &self,
        candidates: &[bridge_traits::audio::AudioCodec],
    ) -> Option<bridge_traits::audio::AudioCodec> {
        self.decoder.supported_format(candidates)
    }
}

impl std::fmt::Debug for Loader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Loader")
            .field("cached", &state.cache.len())
            .field("in_flight", &state.in_flight.len())
            .field("disposed", &state.disposed)
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
