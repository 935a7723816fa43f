//! # Core Playback
//!
//! The playback-resource engine: decode-once, play-many audio playback over
//! the platform bridges defined in `bridge-traits`.
//!
//! ## Components
//!
//! - [`Engine`](engine::Engine) - device lifecycle, master gain, command
//!   routing, the idle-sweep task
//! - [`Loader`](loader::Loader) - deduplicating downloader/decoder with a
//!   shared decode cache
//! - [`NodePool`](pool::NodePool) - per-resource pool of reusable streaming
//!   render nodes
//! - [`Sound`](sound::Sound) - one playable instance: state machine, gain,
//!   seek/rate/loop/fade, sprite sub-ranges
//! - [`Heap`](heap::Heap) - registry of live sounds with idle eviction
//! - [`ActionQueue`](actions::ActionQueue) - keyed deferred commands,
//!   replayed when their prerequisite (load, resume) fires
//!
//! Events flow through the [`Emitter`](core_runtime::events::Emitter) owned
//! by each engine; see `core-runtime` for the event surface.
//!
//! ## Example
//!
//! ```ignore
//! use core_playback::{Engine, EngineConfig, ResourceId, GroupId, SoundArgs};
//! use std::sync::Arc;
//!
//! let engine = Engine::new(device, fetcher, decoder, clock, EngineConfig::default())?;
//! engine.setup().await?;
//!
//! let resource = ResourceId::from("https://example.com/explosion.mp3");
//! engine.load(&[resource.clone()]).await;
//!
//! let sound = engine.sound(&resource, &GroupId::from("sfx"), SoundArgs::default())?;
//! engine.play(sound.id()).await?;
//! ```

pub mod actions;
pub mod config;
pub mod engine;
pub mod error;
pub mod heap;
pub mod ids;
pub mod loader;
pub mod pool;
pub mod sound;

pub use actions::ActionQueue;
pub use config::{EngineConfig, MAX_RATE, MIN_RATE};
pub use engine::{after_load_event, DeviceState, Engine};
pub use error::{EngineError, Result};
pub use heap::Heap;
pub use ids::{GroupId, ResourceId, SoundId};
pub use loader::{LoadOutcome, Loader};
pub use pool::NodePool;
pub use sound::{FadeCurve, Sound, SoundArgs, SoundState};
