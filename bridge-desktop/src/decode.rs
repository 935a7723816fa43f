//! Decode service implementation using Symphonia.

use async_trait::async_trait;
use bridge_traits::audio::{AudioCodec, AudioFormat, DecodedAudio};
use bridge_traits::decode::DecodeService;
use bridge_traits::error::{BridgeError, Result};
use bytes::Bytes;
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{
    CodecType, DecoderOptions, CODEC_TYPE_AAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_NULL,
    CODEC_TYPE_VORBIS,
};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

/// Whole-buffer decoder backed by Symphonia.
///
/// Decodes an entire encoded payload into interleaved f32 PCM in one pass.
/// Decoding is CPU-bound, so it runs on the blocking pool.
#[derive(Debug, Clone, Default)]
pub struct SymphoniaDecodeService;

impl SymphoniaDecodeService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecodeService for SymphoniaDecodeService {
    async fn decode(&self, data: Bytes) -> Result<DecodedAudio> {
        tokio::task::spawn_blocking(move || decode_buffer(data))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("decode task failed: {e}")))?
    }

    fn supported_format(&self, candidates: &[AudioCodec]) -> Option<AudioCodec> {
        candidates
            .iter()
            .find(|codec| {
                matches!(
                    codec,
                    AudioCodec::Mp3
                        | AudioCodec::Aac
                        | AudioCodec::Flac
                        | AudioCodec::Vorbis
                        | AudioCodec::Wav
                )
            })
            .cloned()
    }
}

fn map_codec(codec: CodecType) -> AudioCodec {
    match codec {
        c if c == CODEC_TYPE_MP3 => AudioCodec::Mp3,
        c if c == CODEC_TYPE_AAC => AudioCodec::Aac,
        c if c == CODEC_TYPE_FLAC => AudioCodec::Flac,
        c if c == CODEC_TYPE_VORBIS => AudioCodec::Vorbis,
        _ => AudioCodec::Unknown,
    }
}

fn decode_buffer(data: Bytes) -> Result<DecodedAudio> {
    let cursor = Cursor::new(data.to_vec());
    let media_source = Box::new(cursor) as Box<dyn MediaSource>;
    let mss = MediaSourceStream::new(media_source, Default::default());

    let probed = symphonia::default::get_probe()
        .format(
            &Hint::new(),
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| BridgeError::DecodeFailed(format!("failed to probe format: {e}")))?;

    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| BridgeError::DecodeFailed("no supported audio tracks".to_string()))?;

    let track_id = track.id;
    let codec = map_codec(track.codec_params.codec);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| BridgeError::DecodeFailed("missing sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|ch| ch.count() as u16)
        .unwrap_or(2);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| BridgeError::DecodeFailed(format!("failed to create decoder: {e}")))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(BridgeError::DecodeFailed(format!("packet read failed: {e}")));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let needs_realloc = sample_buf
                    .as_ref()
                    .map(|buf| buf.capacity() < decoded.capacity())
                    .unwrap_or(true);
                if needs_realloc {
                    let spec = *decoded.spec();
                    let duration = decoded.capacity() as u64;
                    sample_buf = Some(SampleBuffer::<f32>::new(duration, spec));
                }
                let buf = sample_buf
                    .as_mut()
                    .ok_or_else(|| BridgeError::DecodeFailed("sample buffer unavailable".into()))?;
                buf.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buf.samples());
            }
            // A corrupt packet is recoverable; skip it and keep going.
            Err(SymphoniaError::DecodeError(e)) => {
                warn!("skipping corrupt packet: {e}");
                continue;
            }
            Err(e) => {
                return Err(BridgeError::DecodeFailed(format!("decode failed: {e}")));
            }
        }
    }

    debug!(
        sample_rate,
        channels,
        frames = samples.len() / channels.max(1) as usize,
        "decoded resource"
    );

    Ok(DecodedAudio::new(
        AudioFormat::new(codec, sample_rate, channels),
        samples,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn garbage_bytes_report_decode_error() {
        let service = SymphoniaDecodeService::new();
        let result = service.decode(Bytes::from_static(&[0xDE, 0xAD, 0xBE, 0xEF])).await;
        assert!(matches!(result, Err(BridgeError::DecodeFailed(_))));
    }

    #[test]
    fn supported_format_prefers_first_candidate() {
        let service = SymphoniaDecodeService::new();
        let picked = service.supported_format(&[
            AudioCodec::Opus,
            AudioCodec::Vorbis,
            AudioCodec::Mp3,
        ]);
        assert_eq!(picked, Some(AudioCodec::Vorbis));
    }

    #[test]
    fn supported_format_empty_when_nothing_matches() {
        let service = SymphoniaDecodeService::new();
        assert_eq!(service.supported_format(&[AudioCodec::Opus]), None);
    }
}
