//! Decode abstraction.

use crate::audio::{AudioCodec, DecodedAudio};
use crate::error::Result;
use bytes::Bytes;

/// Decodes encoded audio bytes into PCM and probes codec support.
///
/// Decoding happens once per resource; the engine caches the result and
/// shares it between every sound instance derived from the resource.
#[async_trait::async_trait]
pub trait DecodeService: Send + Sync {
    /// Decode the whole payload into interleaved f32 PCM.
    async fn decode(&self, data: Bytes) -> Result<DecodedAudio>;

    /// Pick the first candidate codec this platform can decode, if any.
    fn supported_format(&self, candidates: &[AudioCodec]) -> Option<AudioCodec>;
}
