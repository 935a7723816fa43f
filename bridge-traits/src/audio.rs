//! Shared audio value types crossing the bridge seam.
//!
//! [`DecodedAudio`] is the immutable product of a decode: one resource's PCM
//! data, shared between every sound instance derived from that resource via
//! `Arc` without copying.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Supported audio codec identifiers.
///
/// This enum is intentionally extensible; use [`AudioCodec::Other`] for codecs
/// not explicitly listed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    Mp3,
    Aac,
    Flac,
    Vorbis,
    Opus,
    Wav,
    /// Codec is unknown or not yet mapped to a dedicated variant.
    Unknown,
    /// Vendor- or platform-specific codec.
    Other(String),
}

impl AudioCodec {
    /// Returns `true` if this is a lossless codec.
    pub fn is_lossless(&self) -> bool {
        matches!(self, AudioCodec::Flac | AudioCodec::Wav)
    }
}

/// Stream metadata describing decoded PCM data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Codec identifier associated with the source.
    pub codec: AudioCodec,
    /// Sample rate in hertz.
    pub sample_rate: u32,
    /// Number of audio channels.
    pub channels: u16,
}

impl AudioFormat {
    /// Create a new audio format description.
    pub fn new(codec: AudioCodec, sample_rate: u32, channels: u16) -> Self {
        Self {
            codec,
            sample_rate,
            channels,
        }
    }

    /// Standard CD quality (44.1 kHz stereo).
    pub fn cd_quality() -> Self {
        Self {
            codec: AudioCodec::Wav,
            sample_rate: 44100,
            channels: 2,
        }
    }
}

/// Immutable decoded sample data for one resource.
///
/// Samples are interleaved f32 PCM normalized to `[-1.0, 1.0]` (stereo is
/// LRLRLR...). Instances are cheap to clone: the sample storage is shared.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Decoded PCM format.
    pub format: AudioFormat,
    /// Interleaved PCM samples, shared between all referencing sounds.
    pub samples: Arc<[f32]>,
}

impl DecodedAudio {
    /// Create decoded audio from interleaved samples.
    pub fn new(format: AudioFormat, samples: Vec<f32>) -> Self {
        Self {
            format,
            samples: samples.into(),
        }
    }

    /// Number of frames (one sample per channel).
    pub fn frames(&self) -> usize {
        if self.format.channels == 0 {
            return 0;
        }
        self.samples.len() / self.format.channels as usize
    }

    /// Total duration of the decoded data.
    pub fn duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.format.sample_rate as f64)
    }

    /// Returns `true` if the resource decoded to no audio data.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
