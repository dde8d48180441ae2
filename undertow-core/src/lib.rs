//! Undertow Core - Playback source resolution
//!
//! This crate resolves one piece of content to exactly one working playback
//! source. A hosted HTTP(S) URL is preferred; when it is unreachable, slow to
//! start, or stalls mid-stream, playback falls back to a BitTorrent transport.
//! The orchestration engine (service, session state machine, watchdog and
//! timeout race) lives in [`playback`]; magnet handling and URL probing are the
//! default collaborators it is wired with.

pub mod config;
pub mod magnet;
pub mod playback;
pub mod probe;
pub mod tracing_setup;

// Re-export main types for convenient access
pub use config::UndertowConfig;
pub use magnet::{BtihValidator, InfoHash, MagnetError, MagnetNormalizer};
pub use playback::{
    PlaybackCoordinator, PlaybackError, PlaybackRequest, PlaybackResult, PlaybackService,
    PlaybackSession, SessionCollaborators, SessionEvent, SourceKind,
};
pub use probe::{HttpProbe, ProbeError};

/// Core errors that can bubble up from any Undertow subsystem.
#[derive(Debug, thiserror::Error)]
pub enum UndertowError {
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Magnet error: {0}")]
    Magnet(#[from] MagnetError),

    #[error("Probe error: {0}")]
    Probe(#[from] ProbeError),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl UndertowError {
    /// Returns a user-friendly error message suitable for display.
    pub fn user_message(&self) -> String {
        match self {
            UndertowError::Playback(e) => match e {
                PlaybackError::SurfaceNotReady => {
                    "Video player is not ready yet. Please try again.".to_string()
                }
                PlaybackError::UnsupportedMagnet { message } => message.clone(),
                PlaybackError::NoSource { message } => message.clone(),
                PlaybackError::P2p(err) => playback::torrent_error_message(Some(err)),
                _ => "Playback error occurred".to_string(),
            },
            UndertowError::Magnet(MagnetError::InvalidMagnetLink { reason }) => {
                format!("Invalid magnet link: {reason}")
            }
            UndertowError::Magnet(_) => "Magnet link could not be used".to_string(),
            UndertowError::Probe(_) => "Hosted URL could not be checked".to_string(),
            UndertowError::Configuration { .. } => "Configuration error occurred".to_string(),
            UndertowError::Io(_) => "File system error occurred".to_string(),
        }
    }

    /// Checks if this error is due to user input validation.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            UndertowError::Configuration { .. }
                | UndertowError::Magnet(_)
                | UndertowError::Playback(PlaybackError::UnsupportedMagnet { .. })
        )
    }
}

pub type Result<T> = std::result::Result<T, UndertowError>;
