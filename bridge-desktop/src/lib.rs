//! # Desktop Bridge Implementations
//!
//! Native adapters for the bridge traits consumed by the playback engine:
//!
//! - [`ReqwestFetcher`] - resource transfer over HTTP(S) plus local files
//! - [`SymphoniaDecodeService`] - whole-buffer decode to interleaved f32 PCM
//! - [`TokioClock`] - monotonic clock and timers on the tokio timeline
//!   (cooperates with `tokio::time::pause` in tests)
//! - [`NullOutputDevice`] - headless output device honouring the full
//!   lifecycle, for CI, tests and machines without an audio card

pub mod decode;
pub mod device;
pub mod fetch;
pub mod time;

pub use decode::SymphoniaDecodeService;
pub use device::{NullOutputDevice, NullRenderNode};
pub use fetch::ReqwestFetcher;
pub use time::TokioClock;
