//! Value types shared by the playback service, sessions and collaborators.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use super::error::PlaybackError;

/// Source family a session can end up playing from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Url,
    Torrent,
}

impl SourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Url => "url",
            SourceKind::Torrent => "torrent",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session moved on from its current source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackReason {
    /// The start timeout fired before the first attempt settled
    Timeout,
    /// No progress event arrived within the stall window
    Stall,
    /// The surface reported a media error
    Error,
    /// The surface aborted loading
    Abort,
    /// The surface reported a network stall
    Stalled,
    /// `play()` rejected for a reason other than autoplay policy
    PlayError,
    /// The hosted URL probe reported the source unusable
    ProbeFailed,
    /// No hosted URL was supplied
    UrlMissing,
    /// The hosted attempt ended without a specific reason
    UrlUnavailable,
    /// Torrent was attempted first by preference
    Preference,
    /// The watchdog went away without reporting an outcome
    WatchdogTriggered,
}

impl FallbackReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FallbackReason::Timeout => "timeout",
            FallbackReason::Stall => "stall",
            FallbackReason::Error => "error",
            FallbackReason::Abort => "abort",
            FallbackReason::Stalled => "stalled",
            FallbackReason::PlayError => "play-error",
            FallbackReason::ProbeFailed => "probe-failed",
            FallbackReason::UrlMissing => "url-missing",
            FallbackReason::UrlUnavailable => "url-unavailable",
            FallbackReason::Preference => "preference",
            FallbackReason::WatchdogTriggered => "watchdog-triggered",
        }
    }
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deterministic key identifying a logical playback request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestSignature(String);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignatureParts<'a> {
    url: &'a str,
    magnet: &'a str,
    forced_source: Option<SourceKind>,
}

impl RequestSignature {
    /// Derives the signature from trimmed request inputs.
    pub fn derive(url: &str, magnet: &str, forced_source: Option<SourceKind>) -> Self {
        let parts = SignatureParts {
            url,
            magnet,
            forced_source,
        };
        let encoded = serde_json::to_string(&parts).unwrap_or_else(|_| {
            format!(
                "{url}|{magnet}|{}",
                forced_source.map(SourceKind::as_str).unwrap_or_default()
            )
        });
        Self(encoded)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for RequestSignature {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for RequestSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Caller input for one playback attempt. Immutable once a session exists.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaybackRequest {
    url: String,
    magnet: String,
    forced_source: Option<SourceKind>,
    start_timeout: Option<Duration>,
    signature_override: Option<String>,
}

impl PlaybackRequest {
    /// Creates a request; both inputs are trimmed.
    pub fn new(url: impl AsRef<str>, magnet: impl AsRef<str>) -> Self {
        Self {
            url: url.as_ref().trim().to_string(),
            magnet: magnet.as_ref().trim().to_string(),
            ..Default::default()
        }
    }

    /// Pins playback to one source family and disables the start timeout.
    pub fn with_forced_source(mut self, source: Option<SourceKind>) -> Self {
        self.forced_source = source;
        self
    }

    /// Overrides the service-wide start timeout for this request.
    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = Some(timeout);
        self
    }

    /// Uses an explicit signature instead of the derived one.
    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature_override = Some(signature.into());
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn magnet(&self) -> &str {
        &self.magnet
    }

    pub fn forced_source(&self) -> Option<SourceKind> {
        self.forced_source
    }

    pub fn start_timeout(&self) -> Option<Duration> {
        self.start_timeout
    }

    pub fn signature(&self) -> RequestSignature {
        match &self.signature_override {
            Some(signature) => RequestSignature::from(signature.clone()),
            None => RequestSignature::derive(&self.url, &self.magnet, self.forced_source),
        }
    }
}

/// Opaque handle returned by the P2P launcher for a started torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentHandle {
    pub info_hash: String,
    pub name: Option<String>,
}

impl TorrentHandle {
    pub fn new(info_hash: impl Into<String>) -> Self {
        Self {
            info_hash: info_hash.into(),
            name: None,
        }
    }
}

/// Terminal failure of a session.
#[derive(Debug, Clone)]
pub struct PlaybackFailure {
    pub error: Arc<PlaybackError>,
    /// Human-readable text surfaced to the user
    pub message: String,
}

impl PlaybackFailure {
    pub fn new(error: PlaybackError, message: impl Into<String>) -> Self {
        Self {
            error: Arc::new(error),
            message: message.into(),
        }
    }
}

/// Outcome of a session. A source and an error can never coexist.
#[derive(Debug, Clone, Default)]
pub enum PlaybackResult {
    /// Not settled yet
    #[default]
    Pending,
    /// Playing from the hosted URL
    Url,
    /// Playing from the torrent
    Torrent(TorrentHandle),
    /// Neither source could be started
    Failed(PlaybackFailure),
}

impl PlaybackResult {
    pub fn source(&self) -> Option<SourceKind> {
        match self {
            PlaybackResult::Url => Some(SourceKind::Url),
            PlaybackResult::Torrent(_) => Some(SourceKind::Torrent),
            PlaybackResult::Pending | PlaybackResult::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&PlaybackFailure> {
        match self {
            PlaybackResult::Failed(failure) => Some(failure),
            _ => None,
        }
    }

    pub fn torrent_handle(&self) -> Option<&TorrentHandle> {
        match self {
            PlaybackResult::Torrent(handle) => Some(handle),
            _ => None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.source().is_some()
    }
}

/// Classification reported by a URL probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeOutcome {
    Good,
    Bad,
    Error,
    Timeout,
    Opaque,
    Unknown,
}

impl ProbeOutcome {
    /// Bad and errored probes skip `play()` entirely.
    pub fn allows_playback(self) -> bool {
        !matches!(self, ProbeOutcome::Bad | ProbeOutcome::Error)
    }
}

/// Result of probing a hosted URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub outcome: ProbeOutcome,
    pub status: Option<u16>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn good(status: u16) -> Self {
        Self {
            outcome: ProbeOutcome::Good,
            status: Some(status),
            error: None,
        }
    }

    pub fn bad(status: u16) -> Self {
        Self {
            outcome: ProbeOutcome::Bad,
            status: Some(status),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            outcome: ProbeOutcome::Error,
            status: None,
            error: Some(message.into()),
        }
    }

    pub fn with_outcome(outcome: ProbeOutcome) -> Self {
        Self {
            outcome,
            status: None,
            error: None,
        }
    }
}

/// Lifecycle phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Created,
    Running,
    SucceededUrl,
    SucceededTorrent,
    Failed,
    Finished,
}

impl SessionPhase {
    /// Returns the next phase if the transition is legal.
    pub fn advance(self, next: SessionPhase) -> Option<SessionPhase> {
        use SessionPhase::*;
        match (self, next) {
            (Created, Running) => Some(Running),
            (Running, SucceededUrl | SucceededTorrent | Failed) => Some(next),
            (SucceededUrl | SucceededTorrent | Failed, Finished) => Some(Finished),
            (Created | Running | SucceededUrl | SucceededTorrent | Failed | Finished, _) => None,
        }
    }

    /// Settled phase corresponding to a terminal result.
    pub fn for_result(result: &PlaybackResult) -> SessionPhase {
        match result {
            PlaybackResult::Url => SessionPhase::SucceededUrl,
            PlaybackResult::Torrent(_) => SessionPhase::SucceededTorrent,
            PlaybackResult::Failed(_) | PlaybackResult::Pending => SessionPhase::Failed,
        }
    }
}
