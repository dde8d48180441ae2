//! Abstraction over the media element playback is attached to.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::broadcast;

use super::error::PlayError;
use super::types::FallbackReason;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of a playback surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceId(u64);

impl SurfaceId {
    /// Allocates a process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "surface-{}", self.0)
    }
}

/// Media events published by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SurfaceEvent {
    LoadStart,
    LoadedMetadata,
    LoadedData,
    CanPlay,
    CanPlayThrough,
    Play,
    Playing,
    Pause,
    Progress,
    TimeUpdate,
    Suspend,
    Waiting,
    Stalled,
    Ended,
    Error,
    Abort,
    Emptied,
    VolumeChange,
}

/// How the watchdog treats a surface event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchdogSignal {
    /// Give up on the current source immediately
    Fallback(FallbackReason),
    /// Playback is confirmed
    Success,
    /// Progress was made; restart the stall timer
    ResetTimer,
    Ignore,
}

impl SurfaceEvent {
    pub fn name(self) -> &'static str {
        match self {
            SurfaceEvent::LoadStart => "loadstart",
            SurfaceEvent::LoadedMetadata => "loadedmetadata",
            SurfaceEvent::LoadedData => "loadeddata",
            SurfaceEvent::CanPlay => "canplay",
            SurfaceEvent::CanPlayThrough => "canplaythrough",
            SurfaceEvent::Play => "play",
            SurfaceEvent::Playing => "playing",
            SurfaceEvent::Pause => "pause",
            SurfaceEvent::Progress => "progress",
            SurfaceEvent::TimeUpdate => "timeupdate",
            SurfaceEvent::Suspend => "suspend",
            SurfaceEvent::Waiting => "waiting",
            SurfaceEvent::Stalled => "stalled",
            SurfaceEvent::Ended => "ended",
            SurfaceEvent::Error => "error",
            SurfaceEvent::Abort => "abort",
            SurfaceEvent::Emptied => "emptied",
            SurfaceEvent::VolumeChange => "volumechange",
        }
    }

    pub fn watchdog_signal(self) -> WatchdogSignal {
        match self {
            SurfaceEvent::Error => WatchdogSignal::Fallback(FallbackReason::Error),
            SurfaceEvent::Abort => WatchdogSignal::Fallback(FallbackReason::Abort),
            SurfaceEvent::Stalled => WatchdogSignal::Fallback(FallbackReason::Stalled),
            SurfaceEvent::Playing | SurfaceEvent::Ended => WatchdogSignal::Success,
            SurfaceEvent::TimeUpdate
            | SurfaceEvent::Progress
            | SurfaceEvent::LoadedData
            | SurfaceEvent::CanPlay
            | SurfaceEvent::CanPlayThrough
            | SurfaceEvent::Suspend
            | SurfaceEvent::Waiting => WatchdogSignal::ResetTimer,
            SurfaceEvent::LoadStart
            | SurfaceEvent::LoadedMetadata
            | SurfaceEvent::Play
            | SurfaceEvent::Pause
            | SurfaceEvent::Emptied
            | SurfaceEvent::VolumeChange => WatchdogSignal::Ignore,
        }
    }

    /// Events worth tracing with a state snapshot while a session is live.
    pub fn is_debug_traced(self) -> bool {
        !matches!(self, SurfaceEvent::TimeUpdate | SurfaceEvent::VolumeChange)
    }
}

/// How much media the surface has buffered, mirroring HTML media ready states.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReadyState {
    #[default]
    HaveNothing,
    HaveMetadata,
    HaveCurrentData,
    HaveFutureData,
    HaveEnoughData,
}

/// Point-in-time view of a surface's media state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SurfaceSnapshot {
    pub ready_state: ReadyState,
    pub network_state: u8,
    pub current_time: f64,
    pub paused: bool,
    pub muted: bool,
    pub source: Option<String>,
    pub error: Option<String>,
}

impl SurfaceSnapshot {
    /// Whether hosted media is visibly live on the surface.
    pub fn shows_live_media(&self) -> bool {
        self.ready_state >= ReadyState::HaveCurrentData && (self.current_time > 0.0 || !self.paused)
    }
}

/// A media element sessions can load sources into.
///
/// Events are delivered over a broadcast channel so the watchdog, transient
/// status listeners and debug tracing can observe the same stream.
#[async_trait]
pub trait PlaybackSurface: Send + Sync {
    fn id(&self) -> SurfaceId;

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent>;

    fn set_source(&self, url: &str);

    fn clear_source(&self);

    /// Starts playback of the current source.
    ///
    /// # Errors
    /// - `PlayError::NotAllowed` - Autoplay policy requires a user gesture
    /// - Other variants - Media failed to start
    async fn play(&self) -> Result<(), PlayError>;

    fn pause(&self);

    fn set_muted(&self, muted: bool);

    fn snapshot(&self) -> SurfaceSnapshot;

    /// Whether the surface is still attached to a live view.
    fn is_connected(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_classification() {
        assert_eq!(
            SurfaceEvent::Stalled.watchdog_signal(),
            WatchdogSignal::Fallback(FallbackReason::Stalled)
        );
        assert_eq!(SurfaceEvent::Ended.watchdog_signal(), WatchdogSignal::Success);
        assert_eq!(
            SurfaceEvent::Waiting.watchdog_signal(),
            WatchdogSignal::ResetTimer
        );
        assert_eq!(SurfaceEvent::Pause.watchdog_signal(), WatchdogSignal::Ignore);
    }

    #[test]
    fn test_live_media_requires_data_and_motion() {
        let mut snapshot = SurfaceSnapshot {
            ready_state: ReadyState::HaveCurrentData,
            paused: true,
            ..Default::default()
        };
        assert!(!snapshot.shows_live_media());

        snapshot.paused = false;
        assert!(snapshot.shows_live_media());

        snapshot.ready_state = ReadyState::HaveMetadata;
        assert!(!snapshot.shows_live_media());
    }

    #[test]
    fn test_surface_ids_are_unique() {
        assert_ne!(SurfaceId::next(), SurfaceId::next());
    }
}
