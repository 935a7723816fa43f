//! Error types for the playback engine.
//!
//! The split mirrors the propagation policy: per-resource load failures are
//! values on [`LoadOutcome`](crate::loader::LoadOutcome) and never appear
//! here; everything in [`EngineError`] either aborts one operation (bad
//! argument, capacity) or reflects an engine-wide condition (no audio,
//! shutting down).

use thiserror::Error;

/// Errors surfaced by the playback engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The platform exposes no usable audio output. Fatal for this engine
    /// instance; every subsequent playback operation is a no-op.
    #[error("No audio output available: {0}")]
    NoAudio(String),

    /// A playback operation arrived while the engine is destroying or done.
    #[error("Engine is shutting down")]
    EngineClosed,

    /// The engine has not completed `setup()` yet.
    #[error("Engine is not set up")]
    NotReady,

    /// The node pool hit its per-resource cap. A configuration or usage
    /// problem, reported synchronously rather than recovered from.
    #[error("Node pool capacity reached for resource {resource} (max {max})")]
    Capacity { resource: String, max: usize },

    /// A pool operation was called out of order.
    #[error("Node pool usage error: {0}")]
    PoolUsage(String),

    /// The resource has not been loaded and decoded yet.
    #[error("Resource not loaded: {0}")]
    NotLoaded(String),

    /// No live sound with the given id.
    #[error("Unknown sound id {0}")]
    UnknownSound(u64),

    /// The sound instance was already destroyed.
    #[error("Sound is destroyed")]
    SoundDestroyed,

    /// A caller-supplied value was out of range.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A platform bridge operation failed.
    #[error(transparent)]
    Bridge(#[from] bridge_traits::BridgeError),
}

pub type Result<T> = std::result::Result<T, EngineError>;
