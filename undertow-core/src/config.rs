//! Centralized configuration for Undertow.
//!
//! All tunable timeouts and playback policies are defined here to avoid
//! hard-coded values scattered throughout the codebase.

use std::time::Duration;

use crate::UndertowError;

/// Message surfaced when a magnet is present but lacks a usable v1 info hash.
pub const DEFAULT_UNSUPPORTED_MAGNET_MESSAGE: &str =
    "This magnet link is missing a compatible BitTorrent v1 info hash.";

/// Central configuration for all Undertow components.
///
/// Groups related configuration settings into logical sections.
/// Supports environment variable overrides for runtime customization.
#[derive(Debug, Clone, Default)]
pub struct UndertowConfig {
    pub playback: PlaybackSettings,
    pub watchdog: WatchdogSettings,
    pub probe: ProbeSettings,
}

/// Source ordering and startup policy.
#[derive(Debug, Clone)]
pub struct PlaybackSettings {
    /// Try the hosted URL before the torrent when no source is forced
    pub url_first_enabled: bool,
    /// Upper bound on the first attempt's startup (zero disables the race)
    pub start_timeout: Duration,
    /// Status shown when the provided magnet is not usable
    pub unsupported_magnet_message: String,
}

impl Default for PlaybackSettings {
    fn default() -> Self {
        Self {
            url_first_enabled: true,
            start_timeout: Duration::from_millis(5000),
            unsupported_magnet_message: DEFAULT_UNSUPPORTED_MAGNET_MESSAGE.to_string(),
        }
    }
}

/// Mid-playback staleness detection.
#[derive(Debug, Clone)]
pub struct WatchdogSettings {
    /// Time without progress events before hosted playback counts as stalled
    pub stall_timeout: Duration,
}

impl Default for WatchdogSettings {
    fn default() -> Self {
        Self {
            stall_timeout: Duration::from_millis(8000),
        }
    }
}

/// Hosted URL reachability checks.
#[derive(Debug, Clone)]
pub struct ProbeSettings {
    /// Per-request timeout for the probe
    pub request_timeout: Duration,
    /// How long a probe result is reused for the same URL
    pub cache_ttl: Duration,
    /// User agent for probe requests
    pub user_agent: &'static str,
}

impl Default for ProbeSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(4),
            cache_ttl: Duration::from_millis(45_000),
            user_agent: "undertow/0.1.0",
        }
    }
}

impl UndertowConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Invalid overrides are logged and the defaults are used instead; see
    /// [`Self::try_from_env`] for the strict variant.
    pub fn from_env() -> Self {
        Self::try_from_env().unwrap_or_else(|error| {
            tracing::warn!(%error, "Ignoring invalid environment configuration");
            Self::default()
        })
    }

    /// Creates configuration with environment variable overrides.
    ///
    /// # Errors
    ///
    /// - `UndertowError::Configuration` - If an override is set but cannot be parsed
    pub fn try_from_env() -> Result<Self, UndertowError> {
        let mut config = Self::default();

        if let Ok(enabled) = std::env::var("UNDERTOW_URL_FIRST") {
            config.playback.url_first_enabled = enabled.trim().parse::<bool>().map_err(|_| {
                UndertowError::Configuration {
                    reason: format!("UNDERTOW_URL_FIRST must be true or false, got {enabled:?}"),
                }
            })?;
        }

        if let Some(timeout) = env_millis("UNDERTOW_START_TIMEOUT_MS")? {
            config.playback.start_timeout = timeout;
        }

        if let Some(stall) = env_millis("UNDERTOW_STALL_MS")? {
            config.watchdog.stall_timeout = stall;
        }

        if let Some(timeout) = env_millis("UNDERTOW_PROBE_TIMEOUT_MS")? {
            config.probe.request_timeout = timeout;
        }

        if let Some(ttl) = env_millis("UNDERTOW_PROBE_CACHE_TTL_MS")? {
            config.probe.cache_ttl = ttl;
        }

        Ok(config)
    }

    /// Creates a configuration optimized for testing.
    ///
    /// Short timeouts keep paused-clock tests readable.
    pub fn for_testing() -> Self {
        Self {
            playback: PlaybackSettings {
                start_timeout: Duration::from_millis(100),
                ..Default::default()
            },
            probe: ProbeSettings {
                request_timeout: Duration::from_millis(500),
                cache_ttl: Duration::ZERO,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, UndertowError> {
    let Ok(value) = std::env::var(key) else {
        return Ok(None);
    };
    value
        .trim()
        .parse::<u64>()
        .map(|millis| Some(Duration::from_millis(millis)))
        .map_err(|_| UndertowError::Configuration {
            reason: format!("{key} must be a whole number of milliseconds, got {value:?}"),
        })
}
