//! Minimal session harness: runs a single simulated turn through the
//! planner, master clock, and Quality Controller, and prints the
//! resulting playback health and actions as JSON.
//!
//! Takes no external providers — it synthesizes silence in place of TTS
//! output, the same stand-in `NullProviderAdapter` uses.

use talkhead_core::avsync::AudioMasterClock;
use talkhead_core::config::CoreConfig;
use talkhead_core::planner;
use talkhead_core::providers::{pcm, NullProviderAdapter, ProviderAdapter, SpeechRequest};
use talkhead_core::quality::{self, TickSignals, TurnContext};
use talkhead_core::types::ControllerState;
use tracing_subscriber::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var("TALKHEAD_LOG_DIR").unwrap_or_else(|_| "logs".to_owned());
    std::fs::create_dir_all(&log_dir)?;
    let file_appender = tracing_appender::rolling::daily(&log_dir, "session-harness.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).with_filter(env_filter()))
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking_file).with_ansi(false).with_filter(env_filter()))
        .init();

    tracing::info!("talkhead-session-harness starting");

    let config = CoreConfig::default();
    let text = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "Hello there, this is a simulated turn.".to_owned());

    let (plan, _reply_text, _warnings) =
        planner::create_heuristic_turn_plan(&text, None, &config.turn_budget, "en");
    tracing::info!(target_sec = plan.target_sec, "turn planned");

    let adapter = NullProviderAdapter;
    let chunks = adapter
        .generate_speech(SpeechRequest {
            text: text.clone(),
            voice_id: "default".to_owned(),
            sample_rate_hz: config.av_sync.audio_sample_rate_hz,
        })
        .await
        .map_err(|e| anyhow::anyhow!("provider failed: {}", e.reason))?;

    let mut clock = AudioMasterClock::from_policy(&config.av_sync);
    let mut controller = ControllerState::default();
    let capabilities = talkhead_core::config::BackendCapabilities::default();
    let mut final_state = controller.clone();

    for (i, chunk) in chunks.iter().enumerate() {
        let tick = clock.push_audio_samples(chunk.samples.len() as u64)?;
        let now_ms = tick.elapsed_audio_sec * 1000.0;
        let decision = quality::decide(
            &mut controller,
            &TickSignals::default(),
            &config.quality,
            &capabilities,
            &config.degrade_ladder,
            &TurnContext {
                remaining_turn_sec: (plan.target_sec - tick.elapsed_audio_sec).max(0.0),
            },
            now_ms,
        );
        if !decision.actions.is_empty() {
            tracing::info!(chunk = i, actions = ?decision.actions, "quality action");
        }
        final_state = decision.debug.state_after;
    }

    let within_budget = pcm::trim_pcm_chunks(&chunks, plan.target_sec * 1000.0);

    let report = serde_json::json!({
        "turn_plan": {
            "target_seconds": plan.target_sec,
            "segment_count": plan.segments.len(),
        },
        "chunks_generated": chunks.len(),
        "chunks_within_target_budget": within_budget.len(),
        "final_controller_state": format!("{:?}", final_state),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    tracing::info!("talkhead-session-harness finished");
    Ok(())
}
