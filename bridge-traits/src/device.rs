//! Output device and render-node abstractions.
//!
//! The [`OutputDevice`] is the single shared connection to the platform's
//! audio output. The engine opens it once, suspends/resumes it around host
//! lifecycle transitions, and closes it exactly once at teardown.
//!
//! [`RenderNode`]s are the primitives that actually render audio. Two kinds
//! exist, selected by [`RenderMode`]:
//!
//! - **Buffered** nodes play decoded PCM from memory. They are single-use:
//!   created fresh for every play and discarded once they report ended.
//! - **Streaming** nodes are reusable elements that pull from a source URL.
//!   They are pooled by the engine and restarted many times.
//!
//! Implementations must keep every method non-blocking; long operations
//! (device acquisition, suspend, resume) are async.

use crate::audio::DecodedAudio;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;

/// Which flavor of render node to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderMode {
    /// Single-use node fed from a decoded in-memory buffer.
    Buffered,
    /// Reusable element that streams from a source identifier.
    Streaming,
}

/// Information about an opened output device.
#[derive(Debug, Clone)]
pub struct DeviceDescriptor {
    /// Human-readable device name.
    pub name: String,
    /// Output sample rate in hertz.
    pub sample_rate: u32,
    /// Output channel count.
    pub channels: u16,
    /// Whether the platform hands the device over in a suspended state
    /// (e.g. autoplay policies requiring a user gesture).
    pub starts_suspended: bool,
}

/// What a render node should play.
#[derive(Debug, Clone)]
pub enum RenderSource {
    /// Decoded PCM shared with the loader cache.
    Decoded(Arc<DecodedAudio>),
    /// Source identifier for a streaming element to pull on its own.
    Stream(String),
}

/// Parameters applied when (re)starting a render node.
#[derive(Debug, Clone)]
pub struct RenderParams {
    /// Absolute offset into the resource to start rendering at.
    pub offset: Duration,
    /// How long to render before the segment ends; `None` means the source's
    /// natural end. The segment end is `offset + duration`.
    pub duration: Option<Duration>,
    /// Playback rate multiplier.
    pub rate: f32,
    /// Whether the node should restart on its own at segment end.
    pub looping: bool,
    /// Where a looping node restarts. Distinct from `offset`: a render
    /// resumed mid-segment still loops back to the segment start.
    pub loop_start: Duration,
    /// Initial gain for this node's private gain stage.
    pub gain: f32,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            offset: Duration::ZERO,
            duration: None,
            rate: 1.0,
            looping: false,
            loop_start: Duration::ZERO,
            gain: 1.0,
        }
    }
}

/// A low-level playback primitive owned by exactly one sound at a time.
///
/// Invariants enforced by callers (the engine's node pool and sound
/// instances):
/// - a [`RenderMode::Buffered`] node is never restarted after it ended;
/// - a [`RenderMode::Streaming`] node is never driven by two sounds at once.
pub trait RenderNode: Send + Sync {
    /// Begin rendering `source` with the given parameters. Restarting a node
    /// that is already rendering implicitly stops the previous render.
    fn start(&mut self, source: RenderSource, params: RenderParams) -> Result<()>;

    /// Stop rendering. Stopping an idle node is a no-op.
    fn stop(&mut self) -> Result<()>;

    /// Adjust this node's private gain stage.
    fn set_gain(&mut self, gain: f32);

    /// Adjust playback rate of an active render.
    fn set_rate(&mut self, rate: f32);

    /// The flavor this node was created as.
    fn mode(&self) -> RenderMode;

    /// Whether the node is currently rendering.
    fn is_active(&self) -> bool;
}

/// The shared output device connection.
///
/// Owned by the engine; opened once at setup, closed once at terminate.
/// Master gain and lifecycle transitions are only ever driven by the engine,
/// never by individual sounds.
#[async_trait::async_trait]
pub trait OutputDevice: Send + Sync {
    /// Acquire the device connection. Returns an error when the platform
    /// exposes no usable audio output; the engine treats that as fatal for
    /// its instance.
    async fn open(&self) -> Result<DeviceDescriptor>;

    /// Suspend the device, releasing the output exclusively held resources.
    async fn suspend(&self) -> Result<()>;

    /// Resume a previously suspended device.
    async fn resume(&self) -> Result<()>;

    /// Close the device. Further node creation must fail.
    async fn close(&self) -> Result<()>;

    /// Apply the engine-wide master gain.
    fn set_master_gain(&self, gain: f32);

    /// Create a new render node of the requested flavor.
    fn create_render_node(&self, mode: RenderMode) -> Result<Box<dyn RenderNode>>;
}
