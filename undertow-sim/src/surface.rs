//! Scripted media surface.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use undertow_core::playback::{
    PlayError, PlaybackSurface, ReadyState, SurfaceEvent, SurfaceId, SurfaceSnapshot,
};

/// Message a browser attaches to an autoplay rejection.
pub const AUTOPLAY_REJECTION: &str =
    "play() failed because the user didn't interact with the document first.";

/// How the surface reacts to `play()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayScript {
    /// `play()` resolves and nothing else happens
    Manual,
    /// Media starts after the given buffering delay
    StartAfter(Duration),
    /// `play()` rejects with the given error
    Reject(PlayError),
    /// `play()` rejects until the user presses play
    BlockAutoplay,
    /// Metadata loads, then the stream goes silent
    StallAfterLoad,
}

#[derive(Debug, Default)]
struct SurfaceState {
    snapshot: SurfaceSnapshot,
    sources: Vec<String>,
    play_calls: usize,
}

/// In-memory media element driven by a [`PlayScript`].
pub struct SimulatedSurface {
    id: SurfaceId,
    events: broadcast::Sender<SurfaceEvent>,
    script: Mutex<PlayScript>,
    state: Mutex<SurfaceState>,
    connected: AtomicBool,
}

impl SimulatedSurface {
    pub fn new(script: PlayScript) -> Arc<Self> {
        let (events, _) = broadcast::channel(128);
        let state = SurfaceState {
            snapshot: SurfaceSnapshot {
                paused: true,
                ..Default::default()
            },
            ..Default::default()
        };
        Arc::new(Self {
            id: SurfaceId::next(),
            events,
            script: Mutex::new(script),
            state: Mutex::new(state),
            connected: AtomicBool::new(true),
        })
    }

    pub fn set_script(&self, script: PlayScript) {
        *self.script.lock() = script;
    }

    /// Publishes `event` after applying it to the surface state.
    pub fn emit(&self, event: SurfaceEvent) {
        self.apply(event);
        tracing::trace!(surface = %self.id, event = event.name(), "Simulated surface event");
        let _ = self.events.send(event);
    }

    /// Simulates the user pressing play.
    pub fn user_play(&self) {
        tracing::debug!(surface = %self.id, "User pressed play");
        self.emit(SurfaceEvent::Play);
        self.emit(SurfaceEvent::LoadedData);
        self.emit(SurfaceEvent::CanPlay);
        self.emit(SurfaceEvent::Playing);
    }

    /// Detaches the surface from its view.
    pub fn detach(&self) {
        self.connected.store(false, Ordering::Release);
    }

    /// Every source ever loaded, in order.
    pub fn sources(&self) -> Vec<String> {
        self.state.lock().sources.clone()
    }

    pub fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }

    pub fn as_surface(self: &Arc<Self>) -> Arc<dyn PlaybackSurface> {
        Arc::clone(self) as Arc<dyn PlaybackSurface>
    }

    fn apply(&self, event: SurfaceEvent) {
        let mut state = self.state.lock();
        let snapshot = &mut state.snapshot;
        match event {
            SurfaceEvent::LoadedMetadata => {
                snapshot.ready_state = snapshot.ready_state.max(ReadyState::HaveMetadata);
            }
            SurfaceEvent::LoadedData => {
                snapshot.ready_state = snapshot.ready_state.max(ReadyState::HaveCurrentData);
            }
            SurfaceEvent::CanPlay => {
                snapshot.ready_state = snapshot.ready_state.max(ReadyState::HaveFutureData);
            }
            SurfaceEvent::CanPlayThrough => snapshot.ready_state = ReadyState::HaveEnoughData,
            SurfaceEvent::Play => snapshot.paused = false,
            SurfaceEvent::Playing => {
                snapshot.paused = false;
                snapshot.ready_state = snapshot.ready_state.max(ReadyState::HaveFutureData);
            }
            SurfaceEvent::Pause | SurfaceEvent::Ended => snapshot.paused = true,
            SurfaceEvent::TimeUpdate => snapshot.current_time += 0.25,
            SurfaceEvent::Error => snapshot.error = Some("MEDIA_ERR_NETWORK".to_string()),
            _ => {}
        }
    }

    async fn start_after(&self, delay: Duration) {
        self.emit(SurfaceEvent::Play);
        self.emit(SurfaceEvent::LoadedMetadata);
        tokio::time::sleep(delay).await;
        self.emit(SurfaceEvent::LoadedData);
        self.emit(SurfaceEvent::CanPlay);
        self.emit(SurfaceEvent::Playing);
    }
}

#[async_trait]
impl PlaybackSurface for SimulatedSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    fn set_source(&self, url: &str) {
        {
            let mut state = self.state.lock();
            state.sources.push(url.to_string());
            state.snapshot = SurfaceSnapshot {
                network_state: 2,
                paused: true,
                muted: state.snapshot.muted,
                source: Some(url.to_string()),
                ..Default::default()
            };
        }
        self.emit(SurfaceEvent::LoadStart);
    }

    fn clear_source(&self) {
        let had_source = {
            let mut state = self.state.lock();
            let had_source = state.snapshot.source.is_some();
            state.snapshot = SurfaceSnapshot {
                paused: true,
                muted: state.snapshot.muted,
                ..Default::default()
            };
            had_source
        };
        if had_source {
            self.emit(SurfaceEvent::Emptied);
        }
    }

    async fn play(&self) -> Result<(), PlayError> {
        self.state.lock().play_calls += 1;
        let script = self.script.lock().clone();
        match script {
            PlayScript::Manual => Ok(()),
            PlayScript::StartAfter(delay) => {
                self.start_after(delay).await;
                Ok(())
            }
            PlayScript::Reject(error) => Err(error),
            PlayScript::BlockAutoplay => Err(PlayError::NotAllowed {
                message: AUTOPLAY_REJECTION.to_string(),
            }),
            PlayScript::StallAfterLoad => {
                self.emit(SurfaceEvent::Play);
                self.emit(SurfaceEvent::LoadedMetadata);
                Ok(())
            }
        }
    }

    fn pause(&self) {
        let was_playing = {
            let mut state = self.state.lock();
            let was_playing = !state.snapshot.paused;
            state.snapshot.paused = true;
            was_playing
        };
        if was_playing {
            self.emit(SurfaceEvent::Pause);
        }
    }

    fn set_muted(&self, muted: bool) {
        let changed = {
            let mut state = self.state.lock();
            let changed = state.snapshot.muted != muted;
            state.snapshot.muted = muted;
            changed
        };
        if changed {
            self.emit(SurfaceEvent::VolumeChange);
        }
    }

    fn snapshot(&self) -> SurfaceSnapshot {
        self.state.lock().snapshot.clone()
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_start_after_reports_live_media() {
        let surface = SimulatedSurface::new(PlayScript::StartAfter(Duration::from_millis(300)));
        let mut events = surface.subscribe();
        surface.set_source("https://cdn.example.com/a.mp4");

        surface.play().await.unwrap();

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert_eq!(seen.first(), Some(&SurfaceEvent::LoadStart));
        assert_eq!(seen.last(), Some(&SurfaceEvent::Playing));
        assert!(surface.snapshot().shows_live_media());
    }

    #[tokio::test]
    async fn test_block_autoplay_rejects_until_user_plays() {
        let surface = SimulatedSurface::new(PlayScript::BlockAutoplay);

        let error = surface.play().await.unwrap_err();
        assert!(error.is_autoplay_block());
        assert!(surface.snapshot().paused);

        surface.user_play();
        assert!(!surface.snapshot().paused);
    }

    #[test]
    fn test_clear_source_resets_state() {
        let surface = SimulatedSurface::new(PlayScript::Manual);
        surface.set_muted(true);
        surface.set_source("https://cdn.example.com/a.mp4");
        surface.emit(SurfaceEvent::LoadedData);

        surface.clear_source();

        let snapshot = surface.snapshot();
        assert!(snapshot.source.is_none());
        assert_eq!(snapshot.ready_state, ReadyState::HaveNothing);
        assert!(snapshot.muted);
        assert_eq!(surface.sources().len(), 1);
    }
}
