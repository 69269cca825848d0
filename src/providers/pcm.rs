//! PCM container decoding and chunking. Providers hand back raw audio
//! bytes; this module turns them into the chunk sequence the rest of the
//! control core consumes.

use crate::types::PcmChunk;
use crate::{CoreError, Result};

/// Split a flat mono sample buffer into fixed-duration chunks, carrying
/// forward a monotonic sequence number and millisecond timestamps.
pub fn chunks_from_samples(samples: &[f32], sample_rate_hz: u32, chunk_ms: u32) -> Vec<PcmChunk> {
    let chunk_samples = ((sample_rate_hz as u64 * chunk_ms as u64) / 1000).max(1) as usize;
    let mut chunks = Vec::new();
    let mut sequence = 0u64;
    let mut start = 0usize;
    while start < samples.len() {
        let end = (start + chunk_samples).min(samples.len());
        let t0_ms = start as f64 / sample_rate_hz as f64 * 1000.0;
        let t1_ms = end as f64 / sample_rate_hz as f64 * 1000.0;
        chunks.push(PcmChunk {
            samples: samples[start..end].to_vec(),
            sample_rate_hz,
            sequence,
            t0_ms,
            t1_ms,
        });
        sequence += 1;
        start = end;
    }
    chunks
}

/// Decode a 16-bit PCM WAV container to mono chunks. Multi-channel input
/// is down-mixed by taking every `channels`-th sample (the first channel
/// only), not averaged.
pub fn decode_wav(bytes: &[u8], chunk_ms: u32) -> Result<Vec<PcmChunk>> {
    let mut reader = hound::WavReader::new(std::io::Cursor::new(bytes))
        .map_err(|e| CoreError::Validation(format!("invalid wav container: {e}")))?;
    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 {
        return Err(CoreError::Validation("wav declares zero channels".to_owned()));
    }

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| CoreError::Validation(format!("failed to read wav samples: {e}")))?,
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 2_147_483_648.0))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| CoreError::Validation(format!("failed to read wav samples: {e}")))?,
            other => {
                return Err(CoreError::Validation(format!(
                    "unsupported wav bit depth: {other}"
                )));
            }
        },
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| CoreError::Validation(format!("failed to read wav samples: {e}")))?,
    };

    let mono: Vec<f32> = if channels > 1 {
        samples.into_iter().step_by(channels).collect()
    } else {
        samples
    };

    Ok(chunks_from_samples(&mono, spec.sample_rate, chunk_ms))
}

/// Decode headerless little-endian 16-bit mono PCM bytes.
pub fn decode_raw_pcm16(bytes: &[u8], sample_rate_hz: u32, chunk_ms: u32) -> Vec<PcmChunk> {
    let usable_len = bytes.len() - (bytes.len() % 2);
    let samples: Vec<f32> = bytes[..usable_len]
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect();
    chunks_from_samples(&samples, sample_rate_hz, chunk_ms)
}

/// Silence chunks for padding a turn, e.g. while waiting on a provider.
pub fn generate_silence_chunks(duration_sec: f64, sample_rate_hz: u32, chunk_ms: u32) -> Vec<PcmChunk> {
    let total_samples = (duration_sec * sample_rate_hz as f64) as usize;
    chunks_from_samples(&vec![0.0f32; total_samples], sample_rate_hz, chunk_ms)
}

/// Drop chunks (and trim the last kept chunk) past `max_duration_ms`.
pub fn trim_pcm_chunks(chunks: &[PcmChunk], max_duration_ms: f64) -> Vec<PcmChunk> {
    if max_duration_ms <= 0.0 {
        return chunks.to_vec();
    }
    let mut trimmed = Vec::new();
    for chunk in chunks {
        if chunk.t0_ms >= max_duration_ms {
            break;
        }
        if chunk.t1_ms <= max_duration_ms {
            trimmed.push(chunk.clone());
            continue;
        }
        let remaining_ms = max_duration_ms - chunk.t0_ms;
        if remaining_ms <= 0.0 {
            break;
        }
        let keep_samples = ((remaining_ms / 1000.0) * chunk.sample_rate_hz as f64) as usize;
        if keep_samples == 0 {
            break;
        }
        let keep_samples = keep_samples.min(chunk.samples.len());
        trimmed.push(PcmChunk {
            samples: chunk.samples[..keep_samples].to_vec(),
            sample_rate_hz: chunk.sample_rate_hz,
            sequence: chunk.sequence,
            t0_ms: chunk.t0_ms,
            t1_ms: chunk.t0_ms
                + (keep_samples as f64 / chunk.sample_rate_hz as f64) * 1000.0,
        });
        break;
    }
    trimmed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_from_samples_covers_every_sample() {
        let samples = vec![0.0f32; 1600];
        let chunks = chunks_from_samples(&samples, 16_000, 40);
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(total, 1600);
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn decode_raw_pcm16_round_trips_silence() {
        let bytes = vec![0u8; 3200];
        let chunks = decode_raw_pcm16(&bytes, 16_000, 40);
        assert!(chunks.iter().all(|c| c.samples.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn decode_raw_pcm16_drops_trailing_odd_byte() {
        let bytes = vec![0u8; 5];
        let chunks = decode_raw_pcm16(&bytes, 16_000, 40);
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(total, 2);
    }

    #[test]
    fn trim_pcm_chunks_truncates_last_chunk() {
        let chunks = chunks_from_samples(&vec![0.0f32; 1600], 16_000, 40);
        let trimmed = trim_pcm_chunks(&chunks, 30.0);
        assert_eq!(trimmed.len(), 1);
        assert!((trimmed[0].t1_ms - 30.0).abs() < 1e-6);
    }

    #[test]
    fn generate_silence_chunks_matches_duration() {
        let chunks = generate_silence_chunks(0.1, 16_000, 40);
        let total: usize = chunks.iter().map(|c| c.samples.len()).sum();
        assert_eq!(total, 1600);
    }
}
