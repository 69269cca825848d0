//! Mono WAV sink, used for offline inspection and the harness binary.

use crate::types::PcmChunk;
use crate::{CoreError, Result};
use std::path::Path;

/// Write a sequence of chunks as a single 16-bit mono WAV file. Samples
/// are clamped to `[-1, 1]` then scaled by `i16::MAX`, matching the
/// clamp-then-scale convention used for clip export elsewhere in this
/// codebase.
pub fn write_mono_i16(chunks: &[PcmChunk], sample_rate_hz: u32, path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .map_err(|e| CoreError::Validation(format!("failed to create wav writer: {e}")))?;
    for chunk in chunks {
        for &sample in &chunk.samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let value = (clamped * i16::MAX as f32).round() as i16;
            writer
                .write_sample(value)
                .map_err(|e| CoreError::Validation(format!("failed to write wav sample: {e}")))?;
        }
    }
    writer
        .finalize()
        .map_err(|e| CoreError::Validation(format!("failed to finalize wav: {e}")))?;
    Ok(())
}
