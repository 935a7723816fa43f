//! # Core Runtime
//!
//! Shared runtime infrastructure for the playback engine:
//!
//! - **Events**: async [`events::Emitter`] built on `tokio::sync` channels
//! - **Logging**: `tracing-subscriber` bootstrap in [`logging`]
//! - **Errors**: common [`Error`] type for runtime concerns
//!
//! This crate holds the plumbing every other engine crate leans on. It knows
//! nothing about audio; see `core-playback` for the engine itself.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{
    DeviceEvent, Emitter, EngineEvent, EventKind, HandlerToken, LoadEvent, SoundEvent,
    DEFAULT_EVENT_BUFFER_SIZE,
};
pub use logging::{init_logging, LogFormat, LogLevel, LoggingConfig};
