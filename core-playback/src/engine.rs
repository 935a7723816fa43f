//! Top-level playback engine.
//!
//! The engine owns the output-device connection lifecycle, the master gain,
//! the idle-sweep task, and every per-instance collaborator (emitter, action
//! queue, loader, node pool, heap). Multiple engines can coexist; each one
//! owns its collaborators outright and `terminate()` tears down exactly its
//! own state.
//!
//! Device-state-dependent commands route through the action queue: a suspend
//! issued mid-resume, a resume issued mid-suspend, and a play issued while
//! the device is away are all captured under a stable key and replayed once
//! the in-flight transition completes.

use crate::actions::ActionQueue;
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::heap::Heap;
use crate::ids::{GroupId, ResourceId, SoundId};
use crate::loader::{LoadOutcome, Loader};
use crate::pool::NodePool;
use crate::sound::{Sound, SoundArgs, SoundCtx};
use bridge_traits::decode::DecodeService;
use bridge_traits::device::{DeviceDescriptor, OutputDevice, RenderMode, RenderSource};
use bridge_traits::fetch::MediaFetcher;
use bridge_traits::time::Clock;
use core_runtime::events::{DeviceEvent, Emitter, EngineEvent};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Actions under this event run once an in-flight suspend completes.
pub const AFTER_SUSPEND: &str = "after-suspend";
/// Actions under this event run once an in-flight resume completes.
pub const AFTER_RESUME: &str = "after-resume";
/// Play requests captured while the device is away; replayed after resume.
pub const AFTER_PLAY_RESUME: &str = "after-engine-resume";

/// Action-queue event fired when `resource` finishes loading.
pub fn after_load_event(resource: &ResourceId) -> String {
    format!("after-load:{}", resource)
}

/// Lifecycle states of the shared output device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    NotReady,
    Ready,
    Suspending,
    Suspended,
    Resuming,
    Destroying,
    Done,
    /// The platform exposes no usable audio output. Terminal.
    NoAudio,
}

struct Master {
    volume: f32,
    muted: bool,
}

/// The playback-resource engine.
///
/// Construct with [`Engine::new`] inside a tokio runtime, then call
/// [`setup`](Engine::setup) before any playback operation.
pub struct Engine {
    id: Uuid,
    config: EngineConfig,
    device: Arc<dyn OutputDevice>,
    clock: Arc<dyn Clock>,
    emitter: Emitter,
    actions: ActionQueue,
    loader: Loader,
    pool: Arc<NodePool>,
    heap: Heap,
    sound_ctx: Arc<SoundCtx>,
    state: Mutex<DeviceState>,
    master: Mutex<Master>,
    descriptor: Mutex<Option<DeviceDescriptor>>,
    sweep_cancel: Mutex<Option<CancellationToken>>,
    setup_started: AtomicBool,
    next_sound_id: AtomicU64,
}

impl Engine {
    /// Build an engine from its platform bridges. Must be called within a
    /// tokio runtime; the event dispatcher task starts immediately.
    pub fn new(
        device: Arc<dyn OutputDevice>,
        fetcher: Arc<dyn MediaFetcher>,
        decoder: Arc<dyn DecodeService>,
        clock: Arc<dyn Clock>,
        mut config: EngineConfig,
    ) -> Result<Arc<Self>> {
        config.validate()?;

        let emitter = Emitter::new(config.event_buffer_size);
        for registration in config.handlers.drain(..) {
            let handler = registration.handler;
            if registration.once {
                emitter.once(registration.kind, move |e| handler(e));
            } else {
                emitter.on(registration.kind, move |e| handler(e));
            }
        }

        let loader = Loader::new(fetcher, decoder, emitter.clone());
        let pool = Arc::new(NodePool::new(
            Arc::clone(&device),
            config.max_nodes_per_resource,
        ));
        let heap = Heap::new(Arc::clone(&clock), config.idle_threshold);
        let sound_ctx = Arc::new(SoundCtx {
            device: Arc::clone(&device),
            clock: Arc::clone(&clock),
            emitter: emitter.clone(),
            pool: Arc::downgrade(&pool),
        });
        let master = Master {
            volume: config.volume,
            muted: config.muted,
        };

        Ok(Arc::new(Self {
            id: Uuid::new_v4(),
            config,
            device,
            clock,
            emitter,
            actions: ActionQueue::new(),
            loader,
            pool,
            heap,
            sound_ctx,
            state: Mutex::new(DeviceState::NotReady),
            master: Mutex::new(master),
            descriptor: Mutex::new(None),
            sweep_cancel: Mutex::new(None),
            setup_started: AtomicBool::new(false),
            next_sound_id: AtomicU64::new(1),
        }))
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> DeviceState {
        *self.state.lock()
    }

    /// `false` once the engine has hit the no-audio path.
    pub fn is_audio_available(&self) -> bool {
        *self.state.lock() != DeviceState::NoAudio
    }

    pub fn emitter(&self) -> &Emitter {
        &self.emitter
    }

    /// The deferred-action registry, exposed so the façade can key its own
    /// prerequisites (e.g. play-once-loaded under
    /// [`after_load_event`]).
    pub fn actions(&self) -> &ActionQueue {
        &self.actions
    }

    /// Acquire the device connection and start the idle sweep. Idempotent;
    /// a second call is a no-op.
    #[instrument(skip(self), fields(engine = %self.id))]
    pub async fn setup(self: &Arc<Self>) -> Result<()> {
        if self.setup_started.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        match self.device.open().await {
            Err(e) => {
                *self.state.lock() = DeviceState::NoAudio;
                self.emitter.emit(EngineEvent::Device(DeviceEvent::NoAudio {
                    message: e.to_string(),
                }));
                Err(EngineError::NoAudio(e.to_string()))
            }
            Ok(descriptor) => {
                info!(device = %descriptor.name, "output device ready");
                self.device.set_master_gain(self.master_gain());
                let starts_suspended = descriptor.starts_suspended;
                let name = descriptor.name.clone();
                *self.descriptor.lock() = Some(descriptor);
                *self.state.lock() = if starts_suspended {
                    DeviceState::Suspended
                } else {
                    DeviceState::Ready
                };
                self.start_sweep();
                self.emitter
                    .emit(EngineEvent::Device(DeviceEvent::Ready { name }));
                Ok(())
            }
        }
    }

    fn start_sweep(self: &Arc<Self>) {
        let token = CancellationToken::new();
        *self.sweep_cancel.lock() = Some(token.clone());

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let sleep = engine.clock.sleep(engine.config.sweep_interval);
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep => {
                        engine.heap.free(true, None);
                        engine.pool.clean_up();
                    }
                }
            }
        });
    }

    /// Load a batch of resources. One outcome per resource, failures
    /// included; actions deferred under the per-resource load event are
    /// replayed after each successful load and dropped after a failed one.
    pub async fn load(&self, resources: &[ResourceId]) -> Vec<LoadOutcome> {
        let outcomes = self.loader.load_many(resources).await;
        for outcome in &outcomes {
            let key = after_load_event(&outcome.resource);
            if outcome.is_ok() {
                self.actions.run(&key).await;
            } else {
                self.actions.remove(&key, None);
            }
        }
        outcomes
    }

    /// Evict decode cache entries; `None` clears everything.
    pub fn unload(&self, resources: Option<&[ResourceId]>) {
        self.loader.unload(resources);
    }

    pub fn is_loaded(&self, resource: &ResourceId) -> bool {
        self.loader.is_cached(resource)
    }

    /// Create a sound instance bound to `resource`, register it in the heap,
    /// and return its handle. Buffered sounds require the resource to be
    /// loaded first.
    pub fn sound(
        &self,
        resource: &ResourceId,
        group: &GroupId,
        args: SoundArgs,
    ) -> Result<Sound> {
        match *self.state.lock() {
            DeviceState::Destroying | DeviceState::Done => return Err(EngineError::EngineClosed),
            DeviceState::NoAudio => {
                return Err(EngineError::NoAudio("no audio output".to_string()))
            }
            DeviceState::NotReady => return Err(EngineError::NotReady),
            _ => {}
        }

        let source = match args.mode {
            RenderMode::Buffered => {
                let audio = self
                    .loader
                    .cached(resource)
                    .ok_or_else(|| EngineError::NotLoaded(resource.to_string()))?;
                RenderSource::Decoded(audio)
            }
            RenderMode::Streaming => {
                // One group slot per instance; capacity problems surface
                // here, not at play time.
                self.pool.allocate_for_group(resource, group)?;
                RenderSource::Stream(resource.to_string())
            }
        };

        let id = SoundId(self.next_sound_id.fetch_add(1, Ordering::SeqCst));
        let sound = Sound::new(
            id,
            resource.clone(),
            group.clone(),
            source,
            Arc::clone(&self.sound_ctx),
            args,
        )?;
        self.heap.add(sound.clone());
        debug!(sound = id.0, resource = %resource, "sound created");
        Ok(sound)
    }

    /// Look a live sound up by id.
    pub fn get_sound(&self, id: SoundId) -> Option<Sound> {
        self.heap.sound(id)
    }

    /// Every live sound, optionally restricted to one group.
    pub fn sounds(&self, group: Option<&GroupId>) -> Vec<Sound> {
        self.heap.sounds(group)
    }

    /// Run a heap sweep now. Returns the number of sounds destroyed.
    pub fn free(&self, idle_only: bool, group: Option<&GroupId>) -> usize {
        let destroyed = self.heap.free(idle_only, group);
        self.pool.clean_up();
        destroyed
    }

    /// Start playback of a registered sound, routing through the action
    /// queue while the device is between states.
    pub async fn play(self: &Arc<Self>, id: SoundId) -> Result<()> {
        let state = *self.state.lock();
        match state {
            DeviceState::Destroying | DeviceState::Done => Err(EngineError::EngineClosed),
            DeviceState::NoAudio => Err(EngineError::NoAudio("no audio output".to_string())),
            DeviceState::NotReady => Err(EngineError::NotReady),
            DeviceState::Ready => {
                let sound = self
                    .heap
                    .sound(id)
                    .ok_or(EngineError::UnknownSound(id.0))?;
                sound.play()
            }
            DeviceState::Suspending | DeviceState::Suspended | DeviceState::Resuming => {
                let engine = Arc::clone(self);
                self.actions
                    .add(AFTER_PLAY_RESUME, &format!("play:{}", id), false, move || {
                        play_task(Arc::clone(&engine), id)
                    });
                // During Suspending no resume is underway yet; it must be
                // scheduled here or the queued play strands in Suspended.
                let resume_needed =
                    matches!(state, DeviceState::Suspended | DeviceState::Suspending);
                if resume_needed && self.config.auto_resume {
                    self.resume().await?;
                }
                Ok(())
            }
        }
    }

    /// Suspend the output device. Defers itself across an in-flight resume;
    /// a no-op in every state but `Ready`.
    #[instrument(skip(self), fields(engine = %self.id))]
    pub async fn suspend(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                DeviceState::Resuming => {
                    drop(state);
                    let engine = Arc::clone(self);
                    self.actions.add(AFTER_RESUME, "suspend", false, move || {
                        suspend_task(Arc::clone(&engine))
                    });
                    return Ok(());
                }
                DeviceState::Ready => *state = DeviceState::Suspending,
                _ => return Ok(()),
            }
        }

        for sound in self.heap.sounds(None) {
            let _ = sound.stop();
        }

        match self.device.suspend().await {
            Ok(()) => {
                *self.state.lock() = DeviceState::Suspended;
                debug!("device suspended");
                self.emitter.emit(EngineEvent::Device(DeviceEvent::Suspended));
                self.actions.run(AFTER_SUSPEND).await;
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = DeviceState::Ready;
                self.emitter.emit(EngineEvent::Device(DeviceEvent::Error {
                    message: e.to_string(),
                }));
                Err(e.into())
            }
        }
    }

    /// Resume the output device. Defers itself across an in-flight suspend;
    /// resume only ever transitions out of `Suspended`.
    #[instrument(skip(self), fields(engine = %self.id))]
    pub async fn resume(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                DeviceState::Suspending => {
                    drop(state);
                    let engine = Arc::clone(self);
                    self.actions.add(AFTER_SUSPEND, "resume", false, move || {
                        resume_task(Arc::clone(&engine))
                    });
                    return Ok(());
                }
                DeviceState::Suspended => *state = DeviceState::Resuming,
                _ => return Ok(()),
            }
        }

        match self.device.resume().await {
            Ok(()) => {
                *self.state.lock() = DeviceState::Ready;
                debug!("device resumed");
                self.emitter.emit(EngineEvent::Device(DeviceEvent::Resumed));
                self.actions.run(AFTER_RESUME).await;
                self.actions.run(AFTER_PLAY_RESUME).await;
                Ok(())
            }
            Err(e) => {
                *self.state.lock() = DeviceState::Suspended;
                self.emitter.emit(EngineEvent::Device(DeviceEvent::Error {
                    message: e.to_string(),
                }));
                Err(e.into())
            }
        }
    }

    /// Tear the engine down. Idempotent past `Destroying`; re-queues itself
    /// across an in-flight suspend or resume rather than closing the device
    /// mid-transition.
    #[instrument(skip(self), fields(engine = %self.id))]
    pub async fn terminate(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.lock();
            match *state {
                DeviceState::Destroying | DeviceState::Done => return Ok(()),
                DeviceState::Suspending => {
                    drop(state);
                    let engine = Arc::clone(self);
                    self.actions.add(AFTER_SUSPEND, "terminate", false, move || {
                        terminate_task(Arc::clone(&engine))
                    });
                    return Ok(());
                }
                DeviceState::Resuming => {
                    drop(state);
                    let engine = Arc::clone(self);
                    self.actions.add(AFTER_RESUME, "terminate", false, move || {
                        terminate_task(Arc::clone(&engine))
                    });
                    return Ok(());
                }
                _ => *state = DeviceState::Destroying,
            }
        }

        info!(engine = %self.id, "terminating");
        if let Some(token) = self.sweep_cancel.lock().take() {
            token.cancel();
        }
        self.heap.destroy();
        self.pool.dispose();
        self.loader.dispose();
        self.actions.clear();

        let opened = self.descriptor.lock().is_some();
        if opened {
            if let Err(e) = self.device.close().await {
                warn!(error = %e, "device close failed");
            }
        }

        self.emitter.emit(EngineEvent::Device(DeviceEvent::Closed));
        *self.state.lock() = DeviceState::Done;
        self.emitter.clear();
        Ok(())
    }

    fn master_gain(&self) -> f32 {
        let master = self.master.lock();
        if master.muted {
            0.0
        } else {
            master.volume
        }
    }

    pub fn volume(&self) -> f32 {
        self.master.lock().volume
    }

    /// Set the master volume. Applies instantly, independent of suspend
    /// state.
    pub fn set_volume(&self, volume: f32) -> Result<()> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(EngineError::InvalidArgument(format!(
                "volume must be within [0.0, 1.0], got {}",
                volume
            )));
        }
        self.master.lock().volume = volume;
        self.device.set_master_gain(self.master_gain());
        Ok(())
    }

    pub fn is_muted(&self) -> bool {
        self.master.lock().muted
    }

    pub fn mute(&self) {
        self.master.lock().muted = true;
        self.device.set_master_gain(self.master_gain());
    }

    pub fn unmute(&self) {
        self.master.lock().muted = false;
        self.device.set_master_gain(self.master_gain());
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("state", &*self.state.lock())
            .finish()
    }
}

// Deferred transitions are stored boxed so the async state-machine types do
// not recurse through the closures that re-enter them.

fn suspend_task(engine: Arc<Engine>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = engine.suspend().await {
            warn!(error = %e, "deferred suspend failed");
        }
    })
}

fn resume_task(engine: Arc<Engine>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = engine.resume().await {
            warn!(error = %e, "deferred resume failed");
        }
    })
}

fn terminate_task(engine: Arc<Engine>) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = engine.terminate().await {
            warn!(error = %e, "deferred terminate failed");
        }
    })
}

fn play_task(engine: Arc<Engine>, id: SoundId) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if let Err(e) = engine.play(id).await {
            warn!(sound = id.0, error = %e, "deferred play failed");
        }
    })
}
