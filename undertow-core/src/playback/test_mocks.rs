//! Mock implementations for testing playback orchestration.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast;

use super::collaborators::{P2pEngine, P2pLauncher, P2pStartOptions, SessionHooks, UrlProber};
use super::error::{P2pError, PlayError};
use super::surface::{PlaybackSurface, ReadyState, SurfaceEvent, SurfaceId, SurfaceSnapshot};
use super::types::{ProbeResult, TorrentHandle};

/// Lets spawned tasks observe whatever the test just did.
pub(crate) async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[derive(Debug, Default)]
struct MockSurfaceState {
    source: Option<String>,
    sources_set: Vec<String>,
    clears: usize,
    pauses: usize,
    muted: Option<bool>,
    play_calls: usize,
}

/// In-memory surface that records every call.
pub(crate) struct MockSurface {
    id: SurfaceId,
    events: broadcast::Sender<SurfaceEvent>,
    state: Mutex<MockSurfaceState>,
    play_rejection: Mutex<Option<PlayError>>,
    events_on_play: Mutex<Vec<SurfaceEvent>>,
    connected: AtomicBool,
}

impl MockSurface {
    pub(crate) fn new() -> Arc<Self> {
        let (events, _) = broadcast::channel(64);
        Arc::new(Self {
            id: SurfaceId::next(),
            events,
            state: Mutex::new(MockSurfaceState::default()),
            play_rejection: Mutex::new(None),
            events_on_play: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    /// Surface whose `play()` immediately reports `playing`.
    pub(crate) fn playing() -> Arc<Self> {
        let surface = Self::new();
        surface.emit_on_play(vec![SurfaceEvent::Play, SurfaceEvent::Playing]);
        surface
    }

    pub(crate) fn emit(&self, event: SurfaceEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn reject_play_with(&self, error: PlayError) {
        *self.play_rejection.lock() = Some(error);
    }

    pub(crate) fn emit_on_play(&self, events: Vec<SurfaceEvent>) {
        *self.events_on_play.lock() = events;
    }

    /// Simulates the surface being detached from its view.
    pub(crate) fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    pub(crate) fn as_surface(self: &Arc<Self>) -> Arc<dyn PlaybackSurface> {
        Arc::clone(self) as Arc<dyn PlaybackSurface>
    }

    pub(crate) fn sources_set(&self) -> Vec<String> {
        self.state.lock().sources_set.clone()
    }

    pub(crate) fn current_source(&self) -> Option<String> {
        self.state.lock().source.clone()
    }

    pub(crate) fn clears(&self) -> usize {
        self.state.lock().clears
    }

    pub(crate) fn muted(&self) -> Option<bool> {
        self.state.lock().muted
    }

    pub(crate) fn play_calls(&self) -> usize {
        self.state.lock().play_calls
    }
}

#[async_trait]
impl PlaybackSurface for MockSurface {
    fn id(&self) -> SurfaceId {
        self.id
    }

    fn subscribe(&self) -> broadcast::Receiver<SurfaceEvent> {
        self.events.subscribe()
    }

    fn set_source(&self, url: &str) {
        let mut state = self.state.lock();
        state.source = Some(url.to_string());
        state.sources_set.push(url.to_string());
    }

    fn clear_source(&self) {
        let mut state = self.state.lock();
        state.source = None;
        state.clears += 1;
    }

    async fn play(&self) -> Result<(), PlayError> {
        self.state.lock().play_calls += 1;
        if let Some(error) = self.play_rejection.lock().clone() {
            return Err(error);
        }
        let events = self.events_on_play.lock().clone();
        for event in events {
            self.emit(event);
        }
        Ok(())
    }

    fn pause(&self) {
        self.state.lock().pauses += 1;
    }

    fn set_muted(&self, muted: bool) {
        self.state.lock().muted = Some(muted);
    }

    fn snapshot(&self) -> SurfaceSnapshot {
        let state = self.state.lock();
        SurfaceSnapshot {
            ready_state: ReadyState::HaveNothing,
            paused: true,
            muted: state.muted.unwrap_or(false),
            source: state.source.clone(),
            ..Default::default()
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Prober returning a fixed result after an optional delay.
pub(crate) struct MockProber {
    result: ProbeResult,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockProber {
    pub(crate) fn new(result: ProbeResult) -> Arc<Self> {
        Self::delayed(result, Duration::ZERO)
    }

    pub(crate) fn delayed(result: ProbeResult, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            result,
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlProber for MockProber {
    async fn probe(&self, _url: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

/// Launcher that succeeds or fails and records its inputs.
pub(crate) struct MockLauncher {
    failure: Option<P2pError>,
    delay: Duration,
    calls: Mutex<Vec<(String, P2pStartOptions)>>,
}

impl MockLauncher {
    pub(crate) fn succeeding() -> Arc<Self> {
        Arc::new(Self {
            failure: None,
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn failing(error: P2pError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(error),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn delayed(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failure: None,
            delay,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn last_call(&self) -> Option<(String, P2pStartOptions)> {
        self.calls.lock().last().cloned()
    }
}

#[async_trait]
impl P2pLauncher for MockLauncher {
    async fn start(
        &self,
        magnet: &str,
        options: P2pStartOptions,
    ) -> Result<TorrentHandle, P2pError> {
        self.calls.lock().push((magnet.to_string(), options));
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(TorrentHandle::new("mock-torrent")),
        }
    }
}

/// Engine counting cleanups.
#[derive(Default)]
pub(crate) struct MockEngine {
    cleanups: AtomicUsize,
}

impl MockEngine {
    pub(crate) fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl P2pEngine for MockEngine {
    async fn cleanup(&self) -> Result<(), P2pError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hooks recording the order they were invoked in.
#[derive(Default)]
pub(crate) struct RecordingHooks {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingHooks {
    pub(crate) fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().push(name);
    }
}

#[async_trait]
impl SessionHooks for RecordingHooks {
    async fn wait_for_prior_teardown(&self) {
        self.record("wait_for_prior_teardown");
    }

    fn cancel_pending_telemetry(&self) {
        self.record("cancel_pending_telemetry");
    }

    fn clear_timers(&self) {
        self.record("clear_timers");
    }

    async fn show_loading_affordance(&self) {
        self.record("show_loading_affordance");
    }

    fn reset_surface(&self, surface: Arc<dyn PlaybackSurface>) -> Arc<dyn PlaybackSurface> {
        self.record("reset_surface");
        surface
    }

    fn autoplay(&self) {
        self.record("autoplay");
    }
}
