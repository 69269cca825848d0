//! Cooperative per-session executor: one pacing loop per talking-head
//! session, bounded delivery queues, and the three points where the loop
//! suspends (pacing sleep, provider await, bounded queue receive).

use crate::avsync::AudioMasterClock;
use crate::config::CoreConfig;
use crate::providers::VideoFrame;
use crate::quality::{self, TickSignals, TurnContext};
use crate::types::{ControllerState, PcmChunk, PlaybackHealth};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Queue depth for the audio/video delivery channels. Matches the
/// session-level frame budget: at 25 fps this is ~4.8s of buffered video.
pub const QUEUE_CAPACITY: usize = 120;

/// Counts frames dropped because a delivery queue was full. Surfaced on
/// [`PlaybackHealth::late_video_frames_per_s`].
#[derive(Debug, Default)]
pub struct OverflowCounters {
    pub audio_dropped: AtomicU64,
    pub video_dropped: AtomicU64,
}

/// Try to enqueue `item`; on a full queue, drop the newest item (the one
/// being pushed) rather than blocking the pacing loop, and record the
/// drop.
fn try_send_drop_newest<T>(tx: &mpsc::Sender<T>, item: T, dropped: &AtomicU64) {
    if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(item) {
        dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// One talking-head session's live state: the audio master clock, the
/// Quality Controller state machine, and the bounded queues feeding the
/// media transport.
pub struct Session {
    pub session_id: uuid::Uuid,
    pub clock: AudioMasterClock,
    pub controller: ControllerState,
    pub config: CoreConfig,
    audio_tx: mpsc::Sender<PcmChunk>,
    video_tx: mpsc::Sender<VideoFrame>,
    overflow: Arc<OverflowCounters>,
    cancel: CancellationToken,
}

/// Handles for the consumer side of a session's delivery queues.
pub struct SessionReceivers {
    pub audio_rx: mpsc::Receiver<PcmChunk>,
    pub video_rx: mpsc::Receiver<VideoFrame>,
}

impl Session {
    pub fn new(config: CoreConfig, cancel: CancellationToken) -> (Self, SessionReceivers) {
        let (audio_tx, audio_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (video_tx, video_rx) = mpsc::channel(QUEUE_CAPACITY);
        let clock = AudioMasterClock::from_policy(&config.av_sync);
        let session = Self {
            session_id: uuid::Uuid::new_v4(),
            clock,
            controller: ControllerState::default(),
            config,
            audio_tx,
            video_tx,
            overflow: Arc::new(OverflowCounters::default()),
            cancel,
        };
        (session, SessionReceivers { audio_rx, video_rx })
    }

    pub fn overflow(&self) -> Arc<OverflowCounters> {
        self.overflow.clone()
    }

    /// Enqueue a decoded audio chunk, dropping it if the queue is full.
    pub fn push_audio(&mut self, chunk: PcmChunk) -> crate::Result<()> {
        self.clock.push_audio_samples(chunk.samples.len() as u64)?;
        try_send_drop_newest(&self.audio_tx, chunk, &self.overflow.audio_dropped);
        Ok(())
    }

    /// Enqueue a rendered video frame, dropping it if the queue is full.
    pub fn push_video(&self, frame: VideoFrame) {
        try_send_drop_newest(&self.video_tx, frame, &self.overflow.video_dropped);
    }

    /// Current playback health snapshot derived from overflow counters and
    /// the last measured AV offset.
    pub fn playback_health(&self, av_offset_ms: f64, window_sec: f64) -> PlaybackHealth {
        let dropped = self.overflow.video_dropped.load(Ordering::Relaxed) as f64;
        let late_per_s = if window_sec > 0.0 { dropped / window_sec } else { 0.0 };
        PlaybackHealth {
            av_offset_ms,
            late_video_frames_per_s: late_per_s,
            jitter_buffer_ms: self.config.av_sync.target_jitter_buffer_ms,
        }
    }

    /// Run one controller tick and return the actions decided.
    pub fn tick_quality(
        &mut self,
        signals: &TickSignals,
        ctx: &TurnContext,
        now_ms: f64,
    ) -> quality::Decision {
        quality::decide(
            &mut self.controller,
            signals,
            &self.config.quality,
            &crate::config::BackendCapabilities::default(),
            &self.config.degrade_ladder,
            ctx,
            now_ms,
        )
    }

    /// The pacing loop's three suspension points: a deadline sleep, an
    /// idle-timeout bounded wait on the caller-supplied work queue, and
    /// cancellation. Returns `false` once the session is cancelled.
    pub async fn pace_tick(
        &self,
        next_deadline: Instant,
        idle_timeout: Duration,
        work: &mut mpsc::Receiver<()>,
    ) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => {
                debug!(session_id = %self.session_id, "session cancelled");
                false
            }
            _ = tokio::time::sleep_until(next_deadline) => true,
            result = tokio::time::timeout(idle_timeout, work.recv()) => {
                match result {
                    Ok(Some(())) => true,
                    Ok(None) => {
                        warn!(session_id = %self.session_id, "session work channel closed");
                        false
                    }
                    Err(_) => {
                        debug!(session_id = %self.session_id, "session idle timeout elapsed");
                        true
                    }
                }
            }
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_chunk(n: usize) -> PcmChunk {
        PcmChunk {
            samples: vec![0.0; n],
            sample_rate_hz: 48_000,
            sequence: 0,
            t0_ms: 0.0,
            t1_ms: n as f64 / 48_000.0 * 1000.0,
        }
    }

    #[test]
    fn push_audio_advances_clock_and_enqueues() {
        let (mut session, mut rx) = Session::new(CoreConfig::default(), CancellationToken::new());
        session.push_audio(sample_chunk(4800)).expect("push");
        assert_eq!(session.clock.audio_samples_sent(), 4800);
        assert!(rx.audio_rx.try_recv().is_ok());
    }

    #[test]
    fn full_audio_queue_drops_newest_and_counts_overflow() {
        let (mut session, _rx) = Session::new(CoreConfig::default(), CancellationToken::new());
        for _ in 0..QUEUE_CAPACITY + 5 {
            session.push_audio(sample_chunk(10)).expect("push");
        }
        let overflow = session.overflow();
        assert!(overflow.audio_dropped.load(Ordering::Relaxed) >= 5);
    }

    #[tokio::test]
    async fn pace_tick_returns_false_once_cancelled() {
        let cancel = CancellationToken::new();
        let (session, _rx) = Session::new(CoreConfig::default(), cancel.clone());
        let (_tx, mut work) = mpsc::channel(1);
        cancel.cancel();
        let deadline = Instant::now() + Duration::from_secs(5);
        let proceeded = session
            .pace_tick(deadline, Duration::from_millis(10), &mut work)
            .await;
        assert!(!proceeded);
    }

    #[tokio::test]
    async fn pace_tick_proceeds_on_idle_timeout() {
        let (session, _rx) = Session::new(CoreConfig::default(), CancellationToken::new());
        let (_tx, mut work) = mpsc::channel(1);
        let deadline = Instant::now() + Duration::from_secs(5);
        let proceeded = session
            .pace_tick(deadline, Duration::from_millis(5), &mut work)
            .await;
        assert!(proceeded);
    }
}
