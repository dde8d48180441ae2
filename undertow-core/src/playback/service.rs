//! Playback service: shared configuration and session factory.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::analytics::{AnalyticsEvent, AnalyticsHooks};
use super::collaborators::{P2pEngine, SessionCollaborators};
use super::failure::torrent_error_message;
use super::isolation::{await_isolated, call_isolated};
use super::session::PlaybackSession;
use super::surface::PlaybackSurface;
use super::types::PlaybackRequest;
use super::watchdog::{WatchdogGuard, WatchdogOptions, WatchdogRegistry};
use crate::config::{PlaybackSettings, UndertowConfig, WatchdogSettings};
use crate::magnet::{BtihValidator, MagnetNormalizer, MagnetValidator, PlaybackConfigDeriver};

/// State shared by the service and every session it creates.
pub(crate) struct ServiceContext {
    pub(crate) playback: PlaybackSettings,
    pub(crate) stall_timeout: Duration,
    pub(crate) deriver: Arc<dyn PlaybackConfigDeriver>,
    pub(crate) validator: Arc<dyn MagnetValidator>,
    pub(crate) watchdogs: WatchdogRegistry,
    analytics: AnalyticsHooks,
    p2p_engine: Option<Arc<dyn P2pEngine>>,
    unmuted_autoplay: AtomicBool,
}

impl ServiceContext {
    pub(crate) fn dispatch_analytics(&self, event: &AnalyticsEvent) {
        self.analytics.dispatch(event);
    }

    /// Mutes the surface unless the user has previously unmuted playback.
    pub(crate) fn prepare_surface(&self, surface: &dyn PlaybackSurface) {
        let muted = !self.unmuted_autoplay.load(Ordering::Acquire);
        call_isolated("surface.set_muted", || surface.set_muted(muted));
    }

    pub(crate) async fn cleanup_p2p_engine(&self) {
        let Some(engine) = &self.p2p_engine else {
            return;
        };
        match await_isolated("p2p_engine.cleanup", engine.cleanup()).await {
            Some(Ok(())) => tracing::trace!("P2P engine cleaned up"),
            Some(Err(error)) => tracing::warn!(
                %error,
                message = %torrent_error_message(Some(&error)),
                "P2P engine cleanup failed"
            ),
            None => {}
        }
    }
}

/// Entry point for playback: holds shared configuration and creates sessions.
///
/// The service tracks the most recently created session as "current"; older
/// sessions are superseded, not cancelled.
pub struct PlaybackService {
    context: Arc<ServiceContext>,
    current: Mutex<Option<PlaybackSession>>,
}

impl PlaybackService {
    /// Creates a service with default collaborators from `config`.
    pub fn new(config: &UndertowConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> PlaybackServiceBuilder {
        PlaybackServiceBuilder::default()
    }

    /// Creates a session and makes it the current one.
    pub fn create_session(
        &self,
        request: PlaybackRequest,
        collaborators: SessionCollaborators,
    ) -> PlaybackSession {
        let session = PlaybackSession::new(Arc::clone(&self.context), request, collaborators);
        let previous = self.current.lock().replace(session.clone());
        if let Some(previous) = previous.filter(|previous| previous.is_active()) {
            tracing::debug!(
                superseded = %previous.id(),
                session = %session.id(),
                "New session supersedes active session"
            );
        }
        session
    }

    pub fn current_session(&self) -> Option<PlaybackSession> {
        self.current.lock().clone()
    }

    /// Attaches a stall/success watchdog to `surface`.
    ///
    /// Returns a no-op guard when `surface` or `on_fallback` is missing. Any
    /// previous registration on the same surface is torn down first.
    pub fn register_watchdog(
        &self,
        surface: Option<&Arc<dyn PlaybackSurface>>,
        options: WatchdogOptions,
    ) -> WatchdogGuard {
        self.context.watchdogs.register(surface, options)
    }

    pub fn dispatch_analytics(&self, event: &AnalyticsEvent) {
        self.context.dispatch_analytics(event);
    }

    /// Tears down the current session's watchdog, if any.
    pub fn cleanup_watchdog(&self) {
        if let Some(session) = self.current_session() {
            session.cleanup_watchdog();
        }
    }

    pub fn prepare_surface(&self, surface: &dyn PlaybackSurface) {
        self.context.prepare_surface(surface);
    }

    /// Remembers whether the user unmuted playback.
    pub fn record_volume_change(&self, muted: bool) {
        self.context.unmuted_autoplay.store(!muted, Ordering::Release);
    }

    pub async fn cleanup_p2p_engine(&self) {
        self.context.cleanup_p2p_engine().await;
    }

    pub fn url_first_enabled(&self) -> bool {
        self.context.playback.url_first_enabled
    }

    pub fn settings(&self) -> &PlaybackSettings {
        &self.context.playback
    }

    pub fn stall_timeout(&self) -> Duration {
        self.context.stall_timeout
    }
}

impl fmt::Debug for PlaybackService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackService")
            .field("settings", &self.context.playback)
            .field("stall_timeout", &self.context.stall_timeout)
            .field("current", &self.current.lock().as_ref().map(|s| s.id()))
            .finish()
    }
}

/// Builder for [`PlaybackService`].
#[derive(Default)]
pub struct PlaybackServiceBuilder {
    playback: PlaybackSettings,
    watchdog: WatchdogSettings,
    deriver: Option<Arc<dyn PlaybackConfigDeriver>>,
    validator: Option<Arc<dyn MagnetValidator>>,
    analytics: AnalyticsHooks,
    p2p_engine: Option<Arc<dyn P2pEngine>>,
    unmuted_autoplay: bool,
}

impl PlaybackServiceBuilder {
    pub fn config(mut self, config: &UndertowConfig) -> Self {
        self.playback = config.playback.clone();
        self.watchdog = config.watchdog.clone();
        self
    }

    pub fn url_first(mut self, enabled: bool) -> Self {
        self.playback.url_first_enabled = enabled;
        self
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.playback.start_timeout = timeout;
        self
    }

    pub fn stall_timeout(mut self, stall: Duration) -> Self {
        self.watchdog.stall_timeout = stall;
        self
    }

    pub fn unsupported_magnet_message(mut self, message: impl Into<String>) -> Self {
        self.playback.unsupported_magnet_message = message.into();
        self
    }

    pub fn config_deriver(mut self, deriver: Arc<dyn PlaybackConfigDeriver>) -> Self {
        self.deriver = Some(deriver);
        self
    }

    pub fn magnet_validator(mut self, validator: Arc<dyn MagnetValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    pub fn analytics(mut self, hooks: AnalyticsHooks) -> Self {
        self.analytics = hooks;
        self
    }

    pub fn p2p_engine(mut self, engine: Arc<dyn P2pEngine>) -> Self {
        self.p2p_engine = Some(engine);
        self
    }

    /// Starts with the user's unmuted preference already recorded.
    pub fn unmuted_autoplay(mut self, unmuted: bool) -> Self {
        self.unmuted_autoplay = unmuted;
        self
    }

    pub fn build(self) -> PlaybackService {
        let context = ServiceContext {
            playback: self.playback,
            stall_timeout: self.watchdog.stall_timeout,
            deriver: self
                .deriver
                .unwrap_or_else(|| Arc::new(MagnetNormalizer::new())),
            validator: self.validator.unwrap_or_else(|| Arc::new(BtihValidator)),
            watchdogs: WatchdogRegistry::new(),
            analytics: self.analytics,
            p2p_engine: self.p2p_engine,
            unmuted_autoplay: AtomicBool::new(self.unmuted_autoplay),
        };
        PlaybackService {
            context: Arc::new(context),
            current: Mutex::new(None),
        }
    }
}
