//! WAV 工具 - 基于 symphonia 的探测与静音生成

use std::io::Cursor;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

/// 音频处理错误
#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Invalid audio: {0}")]
    InvalidInput(String),

    #[error("Decoding error: {0}")]
    DecodingError(String),
}

/// 音频流信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_ms: u64,
}

/// 探测音频流，返回采样率、声道数和时长
///
/// 容器未给出帧数时逐包解码计算
pub fn probe(data: &[u8]) -> Result<AudioInfo, AudioError> {
    if data.is_empty() {
        return Err(AudioError::InvalidInput("empty audio stream".to_string()));
    }

    let cursor = Cursor::new(data.to_vec());
    let mss = MediaSourceStream::new(Box::new(cursor), Default::default());

    let mut hint = Hint::new();
    hint.with_extension("wav");

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::InvalidInput(format!("Probe failed: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AudioError::DecodingError("No audio track found".to_string()))?;

    let sample_rate = track
        .codec_params
        .sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| AudioError::DecodingError("Unknown sample rate".to_string()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .ok_or_else(|| AudioError::DecodingError("Unknown channel count".to_string()))?;

    let frames = match track.codec_params.n_frames {
        Some(frames) => frames,
        None => {
            let track_id = track.id;
            let mut decoder = symphonia::default::get_codecs()
                .make(&track.codec_params, &DecoderOptions::default())
                .map_err(|e| AudioError::DecodingError(format!("Decoder creation failed: {}", e)))?;

            let mut frames = 0u64;
            loop {
                let packet = match format.next_packet() {
                    Ok(p) => p,
                    Err(symphonia::core::errors::Error::IoError(e))
                        if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                    {
                        break;
                    }
                    Err(e) => {
                        return Err(AudioError::DecodingError(format!("Packet read error: {}", e)));
                    }
                };
                if packet.track_id() != track_id {
                    continue;
                }
                match decoder.decode(&packet) {
                    Ok(decoded) => frames += decoded.frames() as u64,
                    Err(e) => tracing::warn!("Decode error (skipping packet): {}", e),
                }
            }
            frames
        }
    };

    Ok(AudioInfo {
        sample_rate,
        channels,
        duration_ms: frames * 1000 / sample_rate as u64,
    })
}

/// 生成 16-bit 单声道静音 WAV
pub fn silence(duration_ms: u64, sample_rate: u32) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let num_channels: u16 = 1;
    let byte_rate = sample_rate * num_channels as u32 * (bits_per_sample / 8) as u32;
    let block_align = num_channels * (bits_per_sample / 8);

    let frames = (sample_rate as u64 * duration_ms / 1000) as usize;
    let data_size = frames * block_align as usize;
    let file_size = 36 + data_size;

    let mut wav = Vec::with_capacity(44 + data_size);

    // RIFF header
    wav.extend_from_slice(b"RIFF");
    wav.extend_from_slice(&(file_size as u32).to_le_bytes());
    wav.extend_from_slice(b"WAVE");

    // fmt chunk
    wav.extend_from_slice(b"fmt ");
    wav.extend_from_slice(&16u32.to_le_bytes()); // chunk size
    wav.extend_from_slice(&1u16.to_le_bytes()); // PCM format
    wav.extend_from_slice(&num_channels.to_le_bytes());
    wav.extend_from_slice(&sample_rate.to_le_bytes());
    wav.extend_from_slice(&byte_rate.to_le_bytes());
    wav.extend_from_slice(&block_align.to_le_bytes());
    wav.extend_from_slice(&bits_per_sample.to_le_bytes());

    // data chunk
    wav.extend_from_slice(b"data");
    wav.extend_from_slice(&(data_size as u32).to_le_bytes());
    wav.resize(44 + data_size, 0);

    wav
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_header() {
        let wav = silence(1000, 16_000);
        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + 32_000);
    }

    #[test]
    fn test_probe_reports_duration() {
        let info = probe(&silence(1500, 22_050)).unwrap();
        assert_eq!(info.sample_rate, 22_050);
        assert_eq!(info.channels, 1);
        assert_eq!(info.duration_ms, 1500);
    }

    #[test]
    fn test_probe_rejects_garbage() {
        assert!(probe(b"").is_err());
        assert!(probe(b"definitely not audio at all").is_err());
    }
}
