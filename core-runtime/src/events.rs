//! # Event Emitter
//!
//! Event-driven reporting for the playback engine using `tokio::sync`
//! channels. Every component reports and observes through an [`Emitter`].
//!
//! ## Delivery model
//!
//! Events are delivered asynchronously, out-of-band from the call that
//! triggered them: `emit()` enqueues onto an unbounded channel and returns,
//! and a single dispatcher task forwards each event to broadcast subscribers
//! and registered handlers. Because one task drains the queue, enqueue order
//! is preserved per event kind; callers must not rely on any ordering across
//! kinds.
//!
//! ## Consumption styles
//!
//! - [`Emitter::subscribe`] returns a `tokio::sync::broadcast` receiver for
//!   stream-style consumers. Slow receivers observe `RecvError::Lagged`.
//! - [`Emitter::on`] / [`Emitter::once`] register callback handlers keyed by
//!   [`EventKind`]; [`Emitter::off`] removes one handler or a whole kind.
//!   Each `Emitter` is owned by exactly one engine instance, so clearing it
//!   at teardown drops precisely that engine's registrations.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

// Re-export commonly used types
pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

/// Default buffer size for broadcast subscribers.
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

// ============================================================================
// Event Types
// ============================================================================

/// Top-level event enum published through the emitter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
pub enum EngineEvent {
    /// Output device lifecycle events.
    Device(DeviceEvent),
    /// Resource load events.
    Load(LoadEvent),
    /// Sound instance lifecycle events.
    Sound(SoundEvent),
}

/// Events related to the shared output device connection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum DeviceEvent {
    /// Device acquired and running.
    Ready {
        /// Device name reported by the platform.
        name: String,
    },
    /// The platform exposes no usable audio output; fatal for the engine.
    NoAudio { message: String },
    /// Device transitioned to suspended.
    Suspended,
    /// Device transitioned back to running.
    Resumed,
    /// Device closed at teardown.
    Closed,
    /// A device operation failed.
    Error { message: String },
}

/// Events related to resource download/decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum LoadEvent {
    /// Resource decoded and cached.
    Loaded { resource: String },
    /// Transfer or decode failed; reported per resource, siblings unaffected.
    Failed { resource: String, message: String },
}

/// Events related to individual sound instances.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum SoundEvent {
    /// Playback started or resumed.
    Played { sound: u64 },
    /// Natural end of segment reached.
    Ended { sound: u64 },
    /// Playback paused; position captured in milliseconds.
    Paused { sound: u64, position_ms: u64 },
    /// Playback stopped and offset reset.
    Stopped { sound: u64 },
    /// An explicit seek completed.
    Seeked { sound: u64, position_ms: u64 },
    /// A gain ramp ran to completion.
    FadeEnded { sound: u64, volume: f32 },
    /// The instance was destroyed.
    Destroyed { sound: u64 },
    /// A per-instance operation failed.
    Error { sound: Option<u64>, message: String },
}

/// Discriminant for handler registration and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    DeviceReady,
    NoAudio,
    DeviceSuspended,
    DeviceResumed,
    DeviceClosed,
    DeviceError,
    Loaded,
    LoadFailed,
    SoundPlayed,
    SoundEnded,
    SoundPaused,
    SoundStopped,
    SoundSeeked,
    FadeEnded,
    SoundDestroyed,
    SoundError,
}

impl EngineEvent {
    /// The registration key this event dispatches under.
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::Device(DeviceEvent::Ready { .. }) => EventKind::DeviceReady,
            EngineEvent::Device(DeviceEvent::NoAudio { .. }) => EventKind::NoAudio,
            EngineEvent::Device(DeviceEvent::Suspended) => EventKind::DeviceSuspended,
            EngineEvent::Device(DeviceEvent::Resumed) => EventKind::DeviceResumed,
            EngineEvent::Device(DeviceEvent::Closed) => EventKind::DeviceClosed,
            EngineEvent::Device(DeviceEvent::Error { .. }) => EventKind::DeviceError,
            EngineEvent::Load(LoadEvent::Loaded { .. }) => EventKind::Loaded,
            EngineEvent::Load(LoadEvent::Failed { .. }) => EventKind::LoadFailed,
            EngineEvent::Sound(SoundEvent::Played { .. }) => EventKind::SoundPlayed,
            EngineEvent::Sound(SoundEvent::Ended { .. }) => EventKind::SoundEnded,
            EngineEvent::Sound(SoundEvent::Paused { .. }) => EventKind::SoundPaused,
            EngineEvent::Sound(SoundEvent::Stopped { .. }) => EventKind::SoundStopped,
            EngineEvent::Sound(SoundEvent::Seeked { .. }) => EventKind::SoundSeeked,
            EngineEvent::Sound(SoundEvent::FadeEnded { .. }) => EventKind::FadeEnded,
            EngineEvent::Sound(SoundEvent::Destroyed { .. }) => EventKind::SoundDestroyed,
            EngineEvent::Sound(SoundEvent::Error { .. }) => EventKind::SoundError,
        }
    }

    /// Whether this event reports a failure.
    pub fn is_error(&self) -> bool {
        matches!(
            self.kind(),
            EventKind::NoAudio
                | EventKind::DeviceError
                | EventKind::LoadFailed
                | EventKind::SoundError
        )
    }
}

// ============================================================================
// Emitter
// ============================================================================

/// Opaque token identifying one registered handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerToken(u64);

type Handler = Arc<dyn Fn(&EngineEvent) + Send + Sync>;

struct HandlerEntry {
    token: HandlerToken,
    once: bool,
    handler: Handler,
}

#[derive(Default)]
struct Registry {
    handlers: HashMap<EventKind, Vec<HandlerEntry>>,
    next_token: u64,
}

/// Engine-scoped event emitter.
///
/// Cloning shares the underlying channel and registry; each engine instance
/// owns exactly one logical emitter.
#[derive(Clone)]
pub struct Emitter {
    queue: mpsc::UnboundedSender<EngineEvent>,
    bus: broadcast::Sender<EngineEvent>,
    registry: Arc<Mutex<Registry>>,
}

impl Emitter {
    /// Create an emitter and spawn its dispatcher task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(capacity: usize) -> Self {
        let (bus, _) = broadcast::channel(capacity);
        let (queue, mut rx) = mpsc::unbounded_channel::<EngineEvent>();
        let registry = Arc::new(Mutex::new(Registry::default()));

        let dispatch_bus = bus.clone();
        let dispatch_registry = Arc::clone(&registry);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // Broadcast errors only mean "no stream subscribers".
                let _ = dispatch_bus.send(event.clone());

                let to_run: Vec<Handler> = {
                    let mut registry = dispatch_registry.lock();
                    match registry.handlers.get_mut(&event.kind()) {
                        Some(entries) => {
                            let handlers =
                                entries.iter().map(|e| Arc::clone(&e.handler)).collect();
                            entries.retain(|e| !e.once);
                            handlers
                        }
                        None => Vec::new(),
                    }
                };
                // Handlers run outside the registry lock so they may
                // re-register freely.
                if !to_run.is_empty() {
                    tracing::trace!(kind = ?event.kind(), handlers = to_run.len(), "dispatching event");
                }
                for handler in to_run {
                    handler(&event);
                }
            }
        });

        Self {
            queue,
            bus,
            registry,
        }
    }

    /// Enqueue an event for asynchronous delivery.
    pub fn emit(&self, event: EngineEvent) {
        // Send only fails once the dispatcher is gone, i.e. at shutdown.
        let _ = self.queue.send(event);
    }

    /// Create a broadcast receiver for stream-style consumption.
    pub fn subscribe(&self) -> Receiver<EngineEvent> {
        self.bus.subscribe()
    }

    /// Register a persistent handler for `kind`.
    pub fn on<F>(&self, kind: EventKind, handler: F) -> HandlerToken
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.register(kind, false, Arc::new(handler))
    }

    /// Register a handler that runs at most once.
    pub fn once<F>(&self, kind: EventKind, handler: F) -> HandlerToken
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.register(kind, true, Arc::new(handler))
    }

    fn register(&self, kind: EventKind, once: bool, handler: Handler) -> HandlerToken {
        let mut registry = self.registry.lock();
        registry.next_token += 1;
        let token = HandlerToken(registry.next_token);
        registry.handlers.entry(kind).or_default().push(HandlerEntry {
            token,
            once,
            handler,
        });
        token
    }

    /// Remove one handler, or every handler for `kind` when `token` is None.
    pub fn off(&self, kind: EventKind, token: Option<HandlerToken>) {
        let mut registry = self.registry.lock();
        match token {
            Some(token) => {
                if let Some(entries) = registry.handlers.get_mut(&kind) {
                    entries.retain(|e| e.token != token);
                }
            }
            None => {
                registry.handlers.remove(&kind);
            }
        }
    }

    /// Drop every registered handler. Broadcast subscribers are unaffected.
    pub fn clear(&self) {
        self.registry.lock().handlers.clear();
    }

    /// Number of handlers currently registered for `kind`.
    pub fn handler_count(&self, kind: EventKind) -> usize {
        self.registry
            .lock()
            .handlers
            .get(&kind)
            .map(|e| e.len())
            .unwrap_or(0)
    }

    /// Number of active broadcast subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.bus.receiver_count()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
