//! Outbound media encoding: raw microphone blocks to transport-ready 16-bit
//! PCM chunks, raw camera frames to downscaled JPEG stills, and the inverse
//! PCM decode for synthesized audio received from the service.

use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;

use super::capture::RawFrame;
use super::{FRAME_HEIGHT, FRAME_WIDTH, INPUT_SAMPLE_RATE_HZ, JPEG_QUALITY};
use crate::error::{LiveError, Result};
use crate::types::{Blob, ClientMessage, RealtimeInput};

/// Quantizes floating-point samples into the full signed 16-bit range using
/// linear scaling. No dithering, no resampling; capture is fixed at 16kHz.
pub(crate) fn pcm16_from_f32(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&s| (s * 32768.0).clamp(i16::MIN as f32, i16::MAX as f32) as i16)
        .collect()
}

/// Little-endian byte packing of a PCM block.
pub(crate) fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Decodes a little-endian PCM byte stream. A trailing odd byte is dropped.
pub(crate) fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Wraps one PCM audio block as a transport message.
pub(crate) fn audio_chunk_message(samples: &[i16]) -> ClientMessage {
    let encoded = base64::engine::general_purpose::STANDARD.encode(pcm16_to_le_bytes(samples));
    ClientMessage::RealtimeInput(RealtimeInput {
        media: Some(Blob {
            mime_type: format!("audio/pcm;rate={}", INPUT_SAMPLE_RATE_HZ),
            data: encoded,
        }),
    })
}

/// Wraps one compressed video frame as a transport message.
pub(crate) fn video_frame_message(jpeg: &[u8]) -> ClientMessage {
    ClientMessage::RealtimeInput(RealtimeInput {
        media: Some(Blob {
            mime_type: "image/jpeg".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(jpeg),
        }),
    })
}

/// Downscales a raw RGB frame to the fixed outbound resolution and encodes it
/// as JPEG. Failures here are logged and skipped by the caller, never fatal
/// to the session.
pub(crate) fn encode_frame(frame: &RawFrame) -> Result<Vec<u8>> {
    if frame.pixels.is_empty() {
        return Err(LiveError::Encode("camera returned an empty buffer".to_string()));
    }
    let image =
        image::RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone()).ok_or_else(
            || {
                LiveError::Encode(format!(
                    "frame buffer of {} bytes does not match {}x{} RGB",
                    frame.pixels.len(),
                    frame.width,
                    frame.height
                ))
            },
        )?;

    let scaled = if frame.width == FRAME_WIDTH && frame.height == FRAME_HEIGHT {
        image
    } else {
        image::imageops::resize(&image, FRAME_WIDTH, FRAME_HEIGHT, FilterType::Triangle)
    };

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY)
        .encode(
            scaled.as_raw(),
            FRAME_WIDTH,
            FRAME_HEIGHT,
            image::ExtendedColorType::Rgb8,
        )
        .map_err(|e| LiveError::Encode(e.to_string()))?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantization_scales_linearly_and_clamps() {
        let samples = pcm16_from_f32(&[0.0, 0.5, -0.5, 1.0, -1.0, 2.0, -2.0]);
        assert_eq!(samples[0], 0);
        assert_eq!(samples[1], 16384);
        assert_eq!(samples[2], -16384);
        assert_eq!(samples[3], i16::MAX); // 1.0 * 32768 clamps
        assert_eq!(samples[4], i16::MIN);
        assert_eq!(samples[5], i16::MAX);
        assert_eq!(samples[6], i16::MIN);
    }

    #[test]
    fn pcm_bytes_round_trip() {
        let samples = vec![0i16, 1, -1, i16::MAX, i16::MIN, 12345];
        let bytes = pcm16_to_le_bytes(&samples);
        assert_eq!(bytes.len(), samples.len() * 2);
        assert_eq!(pcm16_from_le_bytes(&bytes), samples);
    }

    #[test]
    fn audio_chunk_message_carries_fixed_mime() {
        let msg = audio_chunk_message(&[100, -100]);
        let ClientMessage::RealtimeInput(input) = &msg else {
            panic!("expected realtime input");
        };
        let blob = input.media.as_ref().unwrap();
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(&blob.data)
            .unwrap();
        assert_eq!(decoded.len(), 4);
    }

    #[test]
    fn frames_are_downscaled_to_fixed_resolution() {
        let frame = RawFrame {
            width: 640,
            height: 480,
            pixels: vec![128; 640 * 480 * 3],
        };
        let jpeg = encode_frame(&frame).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), FRAME_WIDTH);
        assert_eq!(decoded.height(), FRAME_HEIGHT);
    }

    #[test]
    fn empty_camera_buffer_is_an_encode_error() {
        let frame = RawFrame {
            width: 640,
            height: 480,
            pixels: Vec::new(),
        };
        assert!(matches!(encode_frame(&frame), Err(LiveError::Encode(_))));
    }

    #[test]
    fn mismatched_frame_buffer_is_an_encode_error() {
        let frame = RawFrame {
            width: 640,
            height: 480,
            pixels: vec![0; 10],
        };
        assert!(matches!(encode_frame(&frame), Err(LiveError::Encode(_))));
    }
}
