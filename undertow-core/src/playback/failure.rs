//! Human-readable status text for failed attempts

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use super::error::{P2pError, PlayError};
use super::types::{ProbeOutcome, ProbeResult};
use crate::config::DEFAULT_UNSUPPORTED_MAGNET_MESSAGE;

pub const HOSTED_URL_SUCCESS_MESSAGE: &str = "✅ Streaming from hosted URL";
pub const AUTOPLAY_PROMPT_MESSAGE: &str = "Press play to start the hosted video.";
pub const NO_SOURCE_MESSAGE: &str = "No playable source found.";

const TORRENT_GENERIC_MESSAGE: &str = "WebTorrent could not start. Please try again.";
const TORRENT_UNREACHABLE_MESSAGE: &str = "WebTorrent could not reach any peers or trackers.";
const TORRENT_BLOCKED_MESSAGE: &str = "WebTorrent was blocked by the browser or network.";

static SSL_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ssl|cert|certificate").expect("static pattern compiles"));
static CORS_ERROR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)cors").expect("static pattern compiles"));
static UNREACHABLE_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)tracker|announce|peer").expect("static pattern compiles")
});
static BLOCKED_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)permission|blocked|denied").expect("static pattern compiles")
});

/// Who is likely responsible for a hosted URL failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureCategory {
    /// The URL needs credentials or a fresh signature
    Auth,
    /// The host, network or browser policy refused it
    External,
}

/// Categorized explanation of a failed hosted URL probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostedFailureDetails {
    pub category: FailureCategory,
    pub message: String,
    pub status: Option<u16>,
}

impl HostedFailureDetails {
    fn external(message: impl Into<String>, status: Option<u16>) -> Self {
        Self {
            category: FailureCategory::External,
            message: message.into(),
            status,
        }
    }
}

/// Explains why a hosted URL probe did not allow playback.
pub fn hosted_failure_details(probe: &ProbeResult) -> HostedFailureDetails {
    let status = probe.status;
    match probe.outcome {
        ProbeOutcome::Timeout => HostedFailureDetails::external(
            "Hosted URL timed out. We’ll try WebTorrent if available.",
            status,
        ),
        ProbeOutcome::Bad => match status {
            Some(401 | 403) => HostedFailureDetails {
                category: FailureCategory::Auth,
                message: "Hosted URL requires authorization or a signed request. \
                          Please log in or re-sign."
                    .to_string(),
                status,
            },
            Some(404) => HostedFailureDetails::external("Hosted URL not found (404).", status),
            Some(code) if code >= 500 => HostedFailureDetails::external(
                format!("Hosted URL unavailable (HTTP {code})."),
                status,
            ),
            Some(code) => {
                HostedFailureDetails::external(format!("Hosted URL failed (HTTP {code})."), status)
            }
            None => HostedFailureDetails::external("Hosted URL failed to load.", status),
        },
        ProbeOutcome::Opaque | ProbeOutcome::Unknown => HostedFailureDetails::external(
            "Hosted URL blocked by browser security (CORS/SSL). \
             We’ll try WebTorrent if available.",
            status,
        ),
        ProbeOutcome::Error => {
            let message = probe.error.as_deref().unwrap_or_default();
            if SSL_ERROR.is_match(message) {
                HostedFailureDetails::external(
                    "Hosted URL blocked due to SSL certificate issues.",
                    status,
                )
            } else if CORS_ERROR.is_match(message) {
                HostedFailureDetails::external(
                    "Hosted URL blocked by CORS. We’ll try WebTorrent if available.",
                    status,
                )
            } else {
                HostedFailureDetails::external(
                    "Hosted URL failed to load due to network or security restrictions.",
                    status,
                )
            }
        }
        ProbeOutcome::Good => HostedFailureDetails::external("Hosted URL failed to load.", status),
    }
}

/// User-facing text for a P2P failure.
pub fn torrent_error_message(err: Option<&P2pError>) -> String {
    let Some(err) = err else {
        return TORRENT_GENERIC_MESSAGE.to_string();
    };

    let text = err.to_string();
    if text.contains(DEFAULT_UNSUPPORTED_MAGNET_MESSAGE) {
        return DEFAULT_UNSUPPORTED_MAGNET_MESSAGE.to_string();
    }

    let message = match err {
        P2pError::Unreachable { .. } => TORRENT_UNREACHABLE_MESSAGE,
        P2pError::Blocked { .. } => TORRENT_BLOCKED_MESSAGE,
        P2pError::StartFailed { reason } | P2pError::CleanupFailed { reason } => {
            if UNREACHABLE_ERROR.is_match(reason) {
                TORRENT_UNREACHABLE_MESSAGE
            } else if BLOCKED_ERROR.is_match(reason) {
                TORRENT_BLOCKED_MESSAGE
            } else {
                TORRENT_GENERIC_MESSAGE
            }
        }
    };
    message.to_string()
}

/// User-facing text for a rejected `play()` on the hosted source.
pub fn play_error_message(err: &PlayError) -> &'static str {
    match err {
        PlayError::Aborted => "Hosted playback was interrupted.",
        PlayError::Network { .. } => "Hosted playback failed due to network/CORS restrictions.",
        PlayError::Decode { .. } => "Hosted playback failed to decode the video.",
        PlayError::NotSupported { .. } => {
            "Hosted playback failed: source not supported or blocked."
        }
        PlayError::NotAllowed { .. } => AUTOPLAY_PROMPT_MESSAGE,
        PlayError::Other { .. } => "Hosted playback failed to load.",
    }
}
