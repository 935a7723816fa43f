//! Engine configuration.

use crate::error::{EngineError, Result};
use core_runtime::events::{EngineEvent, EventKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lower bound of the accepted playback rate range.
pub const MIN_RATE: f32 = 0.5;
/// Upper bound of the accepted playback rate range.
pub const MAX_RATE: f32 = 5.0;

/// An event handler registered through [`EngineConfig`] before setup.
#[derive(Clone)]
pub struct HandlerRegistration {
    pub kind: EventKind,
    pub once: bool,
    pub handler: Arc<dyn Fn(&EngineEvent) + Send + Sync>,
}

impl fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("kind", &self.kind)
            .field("once", &self.once)
            .finish()
    }
}

/// Configuration applied at [`Engine`](crate::engine::Engine) construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Initial master volume, `[0.0, 1.0]`.
    pub volume: f32,
    /// Whether the master output starts muted.
    pub muted: bool,
    /// Cadence of the idle-eviction sweep.
    pub sweep_interval: Duration,
    /// How long a sound may sit idle before the sweep destroys it.
    pub idle_threshold: Duration,
    /// Cap on streaming nodes pooled per resource.
    pub max_nodes_per_resource: usize,
    /// Automatically resume a suspended device when a play request arrives.
    pub auto_resume: bool,
    /// Buffer size for broadcast event subscribers.
    pub event_buffer_size: usize,
    /// Handlers registered on the emitter before the first event can fire.
    #[serde(skip)]
    pub handlers: Vec<HandlerRegistration>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            sweep_interval: Duration::from_secs(5 * 60),
            idle_threshold: Duration::from_secs(60),
            max_nodes_per_resource: 8,
            auto_resume: true,
            event_buffer_size: core_runtime::events::DEFAULT_EVENT_BUFFER_SIZE,
            handlers: Vec::new(),
        }
    }
}

impl EngineConfig {
    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_muted(mut self, muted: bool) -> Self {
        self.muted = muted;
        self
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    pub fn with_max_nodes_per_resource(mut self, max: usize) -> Self {
        self.max_nodes_per_resource = max;
        self
    }

    pub fn with_auto_resume(mut self, auto_resume: bool) -> Self {
        self.auto_resume = auto_resume;
        self
    }

    /// Register an event handler to install at construction.
    pub fn with_handler<F>(mut self, kind: EventKind, once: bool, handler: F) -> Self
    where
        F: Fn(&EngineEvent) + Send + Sync + 'static,
    {
        self.handlers.push(HandlerRegistration {
            kind,
            once,
            handler: Arc::new(handler),
        });
        self
    }

    /// Check the configuration for out-of-range values.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(EngineError::InvalidArgument(format!(
                "volume must be within [0.0, 1.0], got {}",
                self.volume
            )));
        }
        if self.sweep_interval.is_zero() {
            return Err(EngineError::InvalidArgument(
                "sweep_interval must be non-zero".to_string(),
            ));
        }
        if self.idle_threshold.is_zero() {
            return Err(EngineError::InvalidArgument(
                "idle_threshold must be non-zero".to_string(),
            ));
        }
        if self.max_nodes_per_resource == 0 {
            return Err(EngineError::InvalidArgument(
                "max_nodes_per_resource must be at least 1".to_string(),
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(EngineError::InvalidArgument(
                "event_buffer_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
        assert_eq!(
            EngineConfig::default().sweep_interval,
            Duration::from_secs(300)
        );
        assert_eq!(EngineConfig::default().max_nodes_per_resource, 8);
    }

    #[test]
    fn builder_chains() {
        let config = EngineConfig::default()
            .with_volume(0.4)
            .with_muted(true)
            .with_idle_threshold(Duration::from_secs(30))
            .with_max_nodes_per_resource(2);

        assert_eq!(config.volume, 0.4);
        assert!(config.muted);
        assert_eq!(config.idle_threshold, Duration::from_secs(30));
        assert_eq!(config.max_nodes_per_resource, 2);
    }

    #[test]
    fn out_of_range_values_rejected() {
        assert!(EngineConfig::default().with_volume(1.5).validate().is_err());
        assert!(EngineConfig::default()
            .with_max_nodes_per_resource(0)
            .validate()
            .is_err());
        assert!(EngineConfig::default()
            .with_sweep_interval(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn config_serializes_without_handlers() {
        let config = EngineConfig::default().with_handler(EventKind::Loaded, false, |_| {});
        let json = serde_json::to_string(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.volume, config.volume);
        assert!(back.handlers.is_empty());
    }
}
