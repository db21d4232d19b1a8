use thiserror::Error;

/// Failures inside a playback session. They are recovered by degrading to a
/// simpler source and never escape the selector.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error("no streaming engine is available")]
    EngineUnavailable,

    #[error("engine failed to load `{url}`: {reason}")]
    EngineLoad { url: String, reason: String },

    #[error("engine failed to attach to the surface: {reason}")]
    EngineAttach { reason: String },

    #[error("playback surface error: {reason}")]
    Surface { reason: String },
}

impl PlaybackError {
    pub fn engine_load(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::EngineLoad {
            url: url.into(),
            reason: reason.into(),
        }
    }

    pub fn engine_attach(reason: impl Into<String>) -> Self {
        Self::EngineAttach {
            reason: reason.into(),
        }
    }

    pub fn surface(reason: impl Into<String>) -> Self {
        Self::Surface {
            reason: reason.into(),
        }
    }
}
