//! Clock implementation on the tokio timeline.

use bridge_traits::time::Clock;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::time::Instant;

/// Clock backed by `tokio::time`.
///
/// Because both `monotonic()` and `sleep()` read the tokio timeline, tests
/// running under `#[tokio::test(start_paused = true)]` observe fully
/// deterministic timer behavior.
#[derive(Debug, Clone)]
pub struct TokioClock {
    epoch: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn monotonic(&self) -> Duration {
        Instant::now().duration_since(self.epoch)
    }

    fn sleep(&self, duration: Duration) -> BoxFuture<'static, ()> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn monotonic_tracks_paused_time() {
        let clock = TokioClock::new();
        let before = clock.monotonic();
        tokio::time::advance(Duration::from_secs(3)).await;
        let after = clock.monotonic();
        assert_eq!(after - before, Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn sleep_resolves_on_advance() {
        let clock = TokioClock::new();
        let started = clock.monotonic();
        clock.sleep(Duration::from_millis(250)).await;
        assert_eq!(clock.monotonic() - started, Duration::from_millis(250));
    }
}
