//! Headless output device.
//!
//! [`NullOutputDevice`] honours the complete device lifecycle without touching
//! any audio hardware. It exists for CI machines, tests, and "audio optional"
//! deployments: every open/suspend/resume/close transition is tracked, and
//! the nodes it creates record their render activity so tests can assert on
//! engine behavior.

use async_trait::async_trait;
use bridge_traits::device::{
    DeviceDescriptor, OutputDevice, RenderMode, RenderNode, RenderParams, RenderSource,
};
use bridge_traits::error::{BridgeError, Result};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Shared counters for inspecting a [`NullOutputDevice`] from tests.
#[derive(Debug, Default)]
pub struct DeviceActivity {
    pub suspends: AtomicUsize,
    pub resumes: AtomicUsize,
    pub nodes_created: AtomicUsize,
    pub renders_started: AtomicUsize,
    /// Parameters of the most recent `start()` across every node.
    pub last_render: Mutex<Option<RenderParams>>,
}

/// Headless output device implementation.
pub struct NullOutputDevice {
    available: bool,
    starts_suspended: bool,
    closed: AtomicBool,
    activity: Arc<DeviceActivity>,
    master_gain: Mutex<f32>,
}

impl NullOutputDevice {
    /// A device that opens successfully in the running state.
    pub fn new() -> Self {
        Self {
            available: true,
            starts_suspended: false,
            closed: AtomicBool::new(false),
            activity: Arc::new(DeviceActivity::default()),
            master_gain: Mutex::new(1.0),
        }
    }

    /// A device whose `open()` fails, for exercising the no-audio path.
    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new()
        }
    }

    /// A device that opens in the suspended state, as browsers and some
    /// mobile platforms hand it over before a user gesture.
    pub fn starting_suspended() -> Self {
        Self {
            starts_suspended: true,
            ..Self::new()
        }
    }

    /// Activity counters shared with every node this device created.
    pub fn activity(&self) -> Arc<DeviceActivity> {
        Arc::clone(&self.activity)
    }

    /// Last master gain applied by the engine.
    pub fn master_gain(&self) -> f32 {
        *self.master_gain.lock()
    }
}

impl Default for NullOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OutputDevice for NullOutputDevice {
    async fn open(&self) -> Result<DeviceDescriptor> {
        if !self.available {
            return Err(BridgeError::NotAvailable(
                "no audio output on this host".to_string(),
            ));
        }
        debug!("opened null output device");
        Ok(DeviceDescriptor {
            name: "null".to_string(),
            sample_rate: 44100,
            channels: 2,
            starts_suspended: self.starts_suspended,
        })
    }

    async fn suspend(&self) -> Result<()> {
        self.activity.suspends.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.activity.resumes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn set_master_gain(&self, gain: f32) {
        *self.master_gain.lock() = gain;
    }

    fn create_render_node(&self, mode: RenderMode) -> Result<Box<dyn RenderNode>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(BridgeError::NotAvailable("device closed".to_string()));
        }
        self.activity.nodes_created.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(NullRenderNode {
            mode,
            active: false,
            gain: 1.0,
            rate: 1.0,
            activity: Arc::clone(&self.activity),
            last_params: None,
        }))
    }
}

/// Render node produced by [`NullOutputDevice`].
///
/// Renders nothing; records what it was asked to do.
pub struct NullRenderNode {
    mode: RenderMode,
    active: bool,
    gain: f32,
    rate: f32,
    activity: Arc<DeviceActivity>,
    last_params: Option<RenderParams>,
}

impl NullRenderNode {
    /// Parameters from the most recent `start()`.
    pub fn last_params(&self) -> Option<&RenderParams> {
        self.last_params.as_ref()
    }

    pub fn gain(&self) -> f32 {
        self.gain
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }
}

impl RenderNode for NullRenderNode {
    fn start(&mut self, _source: RenderSource, params: RenderParams) -> Result<()> {
        self.activity.renders_started.fetch_add(1, Ordering::SeqCst);
        self.gain = params.gain;
        self.rate = params.rate;
        *self.activity.last_render.lock() = Some(params.clone());
        self.last_params = Some(params);
        self.active = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.active = false;
        Ok(())
    }

    fn set_gain(&mut self, gain: f32) {
        self.gain = gain;
    }

    fn set_rate(&mut self, rate: f32) {
        self.rate = rate;
    }

    fn mode(&self) -> RenderMode {
        self.mode
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::audio::{AudioFormat, DecodedAudio};
    use std::time::Duration;

    #[tokio::test]
    async fn open_reports_descriptor() {
        let device = NullOutputDevice::new();
        let descriptor = device.open().await.unwrap();
        assert!(!descriptor.starts_suspended);
        assert_eq!(descriptor.channels, 2);
    }

    #[tokio::test]
    async fn unavailable_device_fails_open() {
        let device = NullOutputDevice::unavailable();
        assert!(device.open().await.is_err());
    }

    #[tokio::test]
    async fn closed_device_refuses_nodes() {
        let device = NullOutputDevice::new();
        device.close().await.unwrap();
        assert!(device.create_render_node(RenderMode::Buffered).is_err());
    }

    #[test]
    fn node_records_render_parameters() {
        let device = NullOutputDevice::new();
        let mut node = device.create_render_node(RenderMode::Buffered).unwrap();
        let audio = Arc::new(DecodedAudio::new(AudioFormat::cd_quality(), vec![0.0; 64]));

        node.start(
            RenderSource::Decoded(audio),
            RenderParams {
                offset: Duration::from_millis(100),
                duration: Some(Duration::from_secs(1)),
                rate: 2.0,
                looping: false,
                loop_start: Duration::ZERO,
                gain: 0.5,
            },
        )
        .unwrap();

        assert!(node.is_active());
        assert_eq!(device.activity().renders_started.load(Ordering::SeqCst), 1);
        node.stop().unwrap();
        assert!(!node.is_active());
    }
}
