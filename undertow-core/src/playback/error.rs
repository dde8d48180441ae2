//! Error types for playback orchestration and its collaborators.

/// Errors that terminate a playback session.
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("Video element is not ready for playback.")]
    SurfaceNotReady,

    #[error("{message}")]
    UnsupportedMagnet { message: String },

    #[error("{message}")]
    NoSource { message: String },

    #[error("No torrent playback handler provided.")]
    NoTorrentHandler,

    #[error(transparent)]
    P2p(#[from] P2pError),

    #[error("Playback attempt ended unexpectedly: {reason}")]
    AttemptAborted { reason: String },
}

/// Errors reported by the P2P launcher or engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum P2pError {
    #[error("Torrent start failed: {reason}")]
    StartFailed { reason: String },

    #[error("No peers or trackers reachable: {reason}")]
    Unreachable { reason: String },

    #[error("Torrent engine blocked: {reason}")]
    Blocked { reason: String },

    #[error("Torrent engine cleanup failed: {reason}")]
    CleanupFailed { reason: String },
}

/// Rejection returned by a surface's `play()`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlayError {
    /// Autoplay policy requires a user gesture
    #[error("Autoplay not allowed: {message}")]
    NotAllowed { message: String },

    #[error("Playback aborted")]
    Aborted,

    #[error("Network error: {message}")]
    Network { message: String },

    #[error("Decode error: {message}")]
    Decode { message: String },

    #[error("Source not supported: {message}")]
    NotSupported { message: String },

    #[error("Playback failed: {message}")]
    Other { message: String },
}

impl PlayError {
    /// Whether the rejection only means playback is waiting for a user gesture.
    pub fn is_autoplay_block(&self) -> bool {
        matches!(self, PlayError::NotAllowed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_p2p_error_is_transparent() {
        let error = PlaybackError::from(P2pError::StartFailed {
            reason: "no metadata".to_string(),
        });

        assert_eq!(error.to_string(), "Torrent start failed: no metadata");
    }

    #[test]
    fn test_only_not_allowed_is_autoplay_block() {
        let blocked = PlayError::NotAllowed {
            message: "user gesture required".to_string(),
        };

        assert!(blocked.is_autoplay_block());
        assert!(!PlayError::Aborted.is_autoplay_block());
    }
}
