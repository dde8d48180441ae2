//! Playback orchestration
//!
//! A [`PlaybackService`] creates one [`PlaybackSession`] per request. The
//! session prepares the surface, tries the preferred source family under a
//! start timeout, and falls back to the other family when the first attempt
//! fails, times out, or is flagged by the stall watchdog. The
//! [`PlaybackCoordinator`] sits in front and coalesces identical requests.

mod analytics;
mod collaborators;
mod coordinator;
mod error;
mod events;
mod failure;
mod isolation;
mod listeners;
mod service;
mod session;
mod surface;
mod timeout;
mod types;
mod watchdog;

#[cfg(test)]
mod test_mocks;

pub use analytics::{AnalyticsEvent, AnalyticsHooks};
pub use collaborators::{
    NoopHooks, P2pEngine, P2pLauncher, P2pStartOptions, SessionCollaborators, SessionHooks,
    UrlProber,
};
pub use coordinator::PlaybackCoordinator;
pub use error::{P2pError, PlayError, PlaybackError};
pub use events::{
    EventNotifier, SessionEvent, SessionEventKind, SessionStartDetail, SubscriptionId,
};
pub use failure::{
    AUTOPLAY_PROMPT_MESSAGE, FailureCategory, HOSTED_URL_SUCCESS_MESSAGE, HostedFailureDetails,
    NO_SOURCE_MESSAGE, hosted_failure_details, play_error_message, torrent_error_message,
};
pub use service::{PlaybackService, PlaybackServiceBuilder};
pub use session::{PlaybackSession, SessionStart};
pub use surface::{
    PlaybackSurface, ReadyState, SurfaceEvent, SurfaceId, SurfaceSnapshot, WatchdogSignal,
};
pub use timeout::{Raced, TimeoutRace, with_timeout};
pub use types::{
    FallbackReason, PlaybackFailure, PlaybackRequest, PlaybackResult, ProbeOutcome, ProbeResult,
    RequestSignature, SessionPhase, SourceKind, TorrentHandle,
};
pub use watchdog::{
    FallbackCallback, SuccessCallback, WatchdogGuard, WatchdogOptions, WatchdogRegistry,
};
