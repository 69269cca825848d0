//! Error types for the talking-head control core.

/// Top-level error type for the control core.
///
/// Variants follow the taxonomy described in the system design: validation
/// failures are never retried, provider failures carry a stable reason
/// token for the Quality Controller to react to, and fatal errors abort the
/// session. Recoverable mid-stream conditions (late frames, cache overflow)
/// are never represented here — they are recorded as data
/// ([`crate::types::PlaybackHealth`]) instead of raised.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Malformed input: bad plan, schema violation, mismatched envelope
    /// lengths, empty identifiers, non-positive durations. Surfaced
    /// immediately to the caller, never retried internally.
    #[error("validation error: {0}")]
    Validation(String),

    /// An upstream provider (TTS/I2V/lipsync) failed or returned
    /// unparseable output. `reason` is a stable kebab/snake-case token
    /// (e.g. `missing_api_key`, `unsupported_i2v_provider:replicate`).
    #[error("provider error: {0}")]
    Provider(String),

    /// A session-level impossibility (e.g. no anchor available for a
    /// camera mode that requires a refresh). The session transitions to
    /// abort.
    #[error("fatal error: {0}")]
    Fatal(String),

    /// I/O error from the WAV sink or persona/turn-plan file loading.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Bounded-channel send/receive error in the session executor.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, CoreError>;
