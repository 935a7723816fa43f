//! Shared doubles for the integration suites.
//!
//! The fake decoder maps payload length to clip length: a resource served as
//! N bytes decodes to an N-millisecond mono clip. Timing-sensitive tests run
//! under `#[tokio::test(start_paused = true)]`, so every sleep in here rides
//! the paused tokio timeline.

use async_trait::async_trait;
use bridge_traits::audio::{AudioCodec, AudioFormat, DecodedAudio};
use bridge_traits::decode::DecodeService;
use bridge_traits::device::{DeviceDescriptor, OutputDevice, RenderMode, RenderNode};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::fetch::MediaFetcher;
use bytes::Bytes;
use core_playback::{Engine, EngineConfig};
use bridge_desktop::{NullOutputDevice, TokioClock};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Encoded payload that decodes to a clip of `ms` milliseconds.
pub fn payload(ms: usize) -> Bytes {
    Bytes::from(vec![0u8; ms])
}

/// In-memory fetcher with optional latency and scripted failures.
pub struct FakeFetcher {
    resources: Mutex<HashMap<String, Bytes>>,
    failing: Mutex<HashSet<String>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            delay: None,
            fetches: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn serve(self, url: &str, data: Bytes) -> Self {
        self.resources.lock().insert(url.to_string(), data);
        self
    }

    pub fn fail(self, url: &str) -> Self {
        self.failing.lock().insert(url.to_string());
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> BridgeResult<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().contains(url) {
            return Err(BridgeError::TransferFailed(format!("HTTP 404: {}", url)));
        }
        self.resources
            .lock()
            .get(url)
            .cloned()
            .ok_or_else(|| BridgeError::TransferFailed(format!("unknown resource: {}", url)))
    }
}

/// Decoder where one payload byte becomes one millisecond of mono PCM.
pub struct FakeDecoder;

#[async_trait]
impl DecodeService for FakeDecoder {
    async fn decode(&self, data: Bytes) -> BridgeResult<DecodedAudio> {
        if data.is_empty() {
            return Err(BridgeError::DecodeFailed("empty payload".to_string()));
        }
        Ok(DecodedAudio::new(
            AudioFormat::new(AudioCodec::Wav, 1000, 1),
            vec![0.0; data.len()],
        ))
    }

    fn supported_format(&self, candidates: &[AudioCodec]) -> Option<AudioCodec> {
        candidates.first().cloned()
    }
}

/// Output device whose suspend/resume take real (paused-clock) time, for
/// exercising the mid-transition states.
pub struct SlowDevice {
    inner: NullOutputDevice,
    transition: Duration,
}

impl SlowDevice {
    pub fn new(transition: Duration) -> Self {
        Self {
            inner: NullOutputDevice::new(),
            transition,
        }
    }

    pub fn activity(&self) -> Arc<bridge_desktop::device::DeviceActivity> {
        self.inner.activity()
    }
}

#[async_trait]
impl OutputDevice for SlowDevice {
    async fn open(&self) -> BridgeResult<DeviceDescriptor> {
        self.inner.open().await
    }

    async fn suspend(&self) -> BridgeResult<()> {
        tokio::time::sleep(self.transition).await;
        self.inner.suspend().await
    }

    async fn resume(&self) -> BridgeResult<()> {
        tokio::time::sleep(self.transition).await;
        self.inner.resume().await
    }

    async fn close(&self) -> BridgeResult<()> {
        self.inner.close().await
    }

    fn set_master_gain(&self, gain: f32) {
        self.inner.set_master_gain(gain);
    }

    fn create_render_node(&self, mode: RenderMode) -> BridgeResult<Box<dyn RenderNode>> {
        self.inner.create_render_node(mode)
    }
}

/// Engine over a null device and the fakes above.
pub fn engine_with(
    device: Arc<dyn OutputDevice>,
    fetcher: Arc<FakeFetcher>,
    config: EngineConfig,
) -> Arc<Engine> {
    Engine::new(
        device,
        fetcher,
        Arc::new(FakeDecoder),
        Arc::new(TokioClock::new()),
        config,
    )
    .expect("engine config is valid")
}

/// Default test engine serving `url` as a clip of `ms` milliseconds.
pub fn engine_serving(url: &str, ms: usize) -> (Arc<Engine>, Arc<FakeFetcher>) {
    let fetcher = Arc::new(FakeFetcher::new().serve(url, payload(ms)));
    let engine = engine_with(
        Arc::new(NullOutputDevice::new()),
        Arc::clone(&fetcher),
        EngineConfig::default(),
    );
    (engine, fetcher)
}
