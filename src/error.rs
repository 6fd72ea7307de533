//! Error taxonomy for the mission engine.
//!
//! Provider, illustration and recognition failures are recoverable: they are
//! caught at the call site and turned into a message the client can render.
//! `MalformedExercise` marks a provider response that parsed but violates the
//! kind's contract; the current exercise instance is unusable and the caller
//! must request a new one.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The content request failed (network, HTTP or parse). The session stays
    /// in its requesting phase; the caller decides when to retry.
    #[error("content provider failure: {0}")]
    ContentProviderFailure(String),

    /// The provider response parsed but breaks the kind's required-field
    /// contract (empty options, dangling blank id, zero keywords, ...).
    #[error("malformed exercise: {0}")]
    MalformedExercise(String),

    /// Best-effort imagery failed. Never surfaced loudly; the mission
    /// proceeds without a picture.
    #[error("illustration failure: {0}")]
    IllustrationFailure(String),

    /// Speech capability unavailable, denied, or already busy.
    #[error("speech recognition failure: {0}")]
    RecognitionFailure(String),

    /// A difficulty outside 1..=10 reached a curriculum lookup. Upstream
    /// clamping should make this unreachable.
    #[error("invalid difficulty level: {0}")]
    InvalidDifficulty(u8),

    /// The session was driven out of phase (e.g. submit before content
    /// arrived, advance without a submission).
    #[error("invalid transition: cannot {action} while {from}")]
    InvalidTransition { from: &'static str, action: &'static str },

    /// The response shape does not fit the active exercise kind, or points
    /// at an option that does not exist.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl EngineError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        EngineError::MalformedExercise(msg.into())
    }

    pub fn provider(msg: impl Into<String>) -> Self {
        EngineError::ContentProviderFailure(msg.into())
    }
}
