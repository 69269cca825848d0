//! External interface abstraction. The control core never talks to an
//! LLM, TTS, image-to-video, or lipsync backend directly: every such
//! call goes through a [`ProviderAdapter`], so backend swaps and test
//! doubles never touch the session/pacing code.

pub mod pcm;
pub mod wav;

use crate::types::{PcmChunk, RoiTransform, VisemeEvent};
use async_trait::async_trait;

/// A provider call failed. `reason` is a stable, lowercase_snake_case
/// token (e.g. `"rate_limited"`, `"timeout"`, `"backend_unavailable"`)
/// the Quality Controller can match on without parsing free text.
#[derive(Debug, Clone, thiserror::Error)]
#[error("provider error: {reason}")]
pub struct ProviderError {
    pub reason: String,
    pub retryable: bool,
}

impl ProviderError {
    pub fn new(reason: impl Into<String>, retryable: bool) -> Self {
        Self {
            reason: reason.into(),
            retryable,
        }
    }
}

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Raw video frame handed back by an image-to-video or lipsync backend.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub t_ms: f64,
    pub rgb: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Speech synthesis request.
#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    pub voice_id: String,
    pub sample_rate_hz: u32,
}

/// Image-to-video animation request for one turn segment.
#[derive(Debug, Clone)]
pub struct VideoRequest {
    pub anchor_image_ref: String,
    pub duration_sec: f64,
    pub roi: RoiTransform,
}

/// Lipsync application request: drive `frames` with `visemes`.
#[derive(Debug, Clone)]
pub struct LipsyncRequest {
    pub frames: Vec<VideoFrame>,
    pub visemes: Vec<VisemeEvent>,
}

/// Adapter contract every speech/animation/lipsync backend implements.
/// New backends only need to implement this trait; the session executor
/// and Quality Controller never depend on a concrete backend type.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Stable backend identifier used in `BackendCapabilities::failover_backend_id`.
    fn id(&self) -> &'static str;

    async fn generate_speech(&self, request: SpeechRequest) -> ProviderResult<Vec<PcmChunk>>;

    async fn generate_video_i2v(&self, request: VideoRequest) -> ProviderResult<Vec<VideoFrame>>;

    async fn apply_lipsync(&self, request: LipsyncRequest) -> ProviderResult<Vec<VideoFrame>>;
}

/// A no-op adapter producing silence and a single repeated frame. Used
/// in tests and as a fallback target for `FALLBACK_OFFLINE_CLIP`.
pub struct NullProviderAdapter;

#[async_trait]
impl ProviderAdapter for NullProviderAdapter {
    fn id(&self) -> &'static str {
        "null"
    }

    async fn generate_speech(&self, request: SpeechRequest) -> ProviderResult<Vec<PcmChunk>> {
        let seconds = crate::planner::estimate_speech_seconds(&request.text, "en");
        Ok(pcm::generate_silence_chunks(seconds, request.sample_rate_hz, 40))
    }

    async fn generate_video_i2v(&self, request: VideoRequest) -> ProviderResult<Vec<VideoFrame>> {
        let frame_count = (request.duration_sec * 25.0).max(1.0) as usize;
        Ok((0..frame_count)
            .map(|i| VideoFrame {
                t_ms: i as f64 * 40.0,
                rgb: Vec::new(),
                width: 0,
                height: 0,
            })
            .collect())
    }

    async fn apply_lipsync(&self, request: LipsyncRequest) -> ProviderResult<Vec<VideoFrame>> {
        Ok(request.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_adapter_generates_silence_proportional_to_text() {
        let adapter = NullProviderAdapter;
        let chunks = adapter
            .generate_speech(SpeechRequest {
                text: "hello world this is a test".to_owned(),
                voice_id: "v1".to_owned(),
                sample_rate_hz: 16_000,
            })
            .await
            .expect("speech");
        assert!(!chunks.is_empty());
    }

    #[tokio::test]
    async fn null_adapter_lipsync_passes_frames_through() {
        let adapter = NullProviderAdapter;
        let frames = vec![VideoFrame {
            t_ms: 0.0,
            rgb: vec![0, 0, 0],
            width: 1,
            height: 1,
        }];
        let result = adapter
            .apply_lipsync(LipsyncRequest {
                frames: frames.clone(),
                visemes: Vec::new(),
            })
            .await
            .expect("lipsync");
        assert_eq!(result.len(), frames.len());
    }
}
