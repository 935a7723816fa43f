//! Time abstraction.
//!
//! Provides an injectable monotonic time source and async sleep so the
//! engine's timers (end-of-segment, fade ramps, idle sweeps) stay
//! deterministic under test.

use futures::future::BoxFuture;
use std::time::Duration;

/// Monotonic time source and timer primitive.
///
/// `monotonic()` reports time elapsed since an implementation-defined epoch;
/// only differences between readings are meaningful. `sleep()` resolves after
/// the given duration on the implementation's timeline, which lets test
/// clocks drive time forward manually or through a paused runtime.
pub trait Clock: Send + Sync {
    /// Time elapsed since this clock's epoch.
    fn monotonic(&self) -> Duration;

    /// Sleep for `duration` on this clock's timeline.
    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()>;
}
