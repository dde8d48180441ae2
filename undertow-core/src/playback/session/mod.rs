//! Playback session state machine.
//!
//! A session runs one request to completion: it prepares the surface, decides
//! which source family to try first, races the first attempt against the start
//! timeout, falls back to the other family, and publishes exactly one terminal
//! result followed by a single `finished` event.

mod hosted;
mod torrent;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use self::hosted::HostedOutcome;
use self::torrent::TorrentSlot;
use super::analytics::AnalyticsEvent;
use super::collaborators::SessionCollaborators;
use super::error::PlaybackError;
use super::events::{
    EventNotifier, SessionEvent, SessionEventKind, SessionStartDetail, SubscriptionId,
};
use super::failure::{NO_SOURCE_MESSAGE, torrent_error_message};
use super::isolation::{await_isolated, call_isolated};
use super::listeners::{ListenerTask, spawn_debug_listener};
use super::service::ServiceContext;
use super::surface::PlaybackSurface;
use super::timeout::{Raced, with_timeout};
use super::types::{
    FallbackReason, PlaybackFailure, PlaybackRequest, PlaybackResult, RequestSignature,
    SessionPhase, SourceKind, TorrentHandle,
};
use super::watchdog::{WatchdogGuard, WatchdogOptions};
use crate::magnet::TorrentPlaybackConfig;

/// Memoized result of [`PlaybackSession::start`]; every clone resolves to the same result.
pub type SessionStart = Shared<BoxFuture<'static, PlaybackResult>>;

/// Which attempt, if any, may publish the session's source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WinnerSlot {
    Open,
    Claimed(SourceKind),
    /// The session finished; nothing may publish anymore
    Closed,
}

/// Handle to one playback attempt. Cloning shares the same session.
#[derive(Clone)]
pub struct PlaybackSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    request: PlaybackRequest,
    signature: RequestSignature,
    start_timeout: Duration,
    context: Arc<ServiceContext>,
    collaborators: SessionCollaborators,
    config: TorrentPlaybackConfig,
    magnet_for_playback: Option<String>,
    fallback_magnet: Option<String>,
    events: EventNotifier<SessionEvent>,
    phase: Mutex<SessionPhase>,
    finished: AtomicBool,
    result: Mutex<PlaybackResult>,
    watchdog: Mutex<Option<WatchdogGuard>>,
    active_surface: Mutex<Option<Arc<dyn PlaybackSurface>>>,
    live_listener: Mutex<Option<ListenerTask>>,
    debug_listener: Mutex<Option<ListenerTask>>,
    torrent_slot: Mutex<TorrentSlot>,
    winner: Mutex<WinnerSlot>,
    start: OnceLock<SessionStart>,
}

impl PlaybackSession {
    pub(crate) fn new(
        context: Arc<ServiceContext>,
        request: PlaybackRequest,
        collaborators: SessionCollaborators,
    ) -> Self {
        let config = context.deriver.derive(request.magnet(), request.url());
        let usable = !config.magnet.is_empty() && context.validator.is_valid(&config.magnet);
        let magnet_for_playback = usable.then(|| config.magnet.clone());
        let fallback_magnet =
            (usable && !config.fallback_magnet.is_empty()).then(|| config.fallback_magnet.clone());
        let start_timeout = request
            .start_timeout()
            .unwrap_or(context.playback.start_timeout);

        let inner = SessionInner {
            id: Uuid::new_v4(),
            signature: request.signature(),
            request,
            start_timeout,
            context,
            collaborators,
            config,
            magnet_for_playback,
            fallback_magnet,
            events: EventNotifier::new("session listener"),
            phase: Mutex::new(SessionPhase::Created),
            finished: AtomicBool::new(false),
            result: Mutex::new(PlaybackResult::Pending),
            watchdog: Mutex::new(None),
            active_surface: Mutex::new(None),
            live_listener: Mutex::new(None),
            debug_listener: Mutex::new(None),
            torrent_slot: Mutex::new(TorrentSlot::Idle),
            winner: Mutex::new(WinnerSlot::Open),
            start: OnceLock::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn signature(&self) -> &RequestSignature {
        &self.inner.signature
    }

    pub fn request(&self) -> &PlaybackRequest {
        &self.inner.request
    }

    /// Runs the session. Calling it again returns the same shared future.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> SessionStart {
        self.inner
            .start
            .get_or_init(|| {
                let handle = tokio::spawn(Arc::clone(&self.inner).execute());
                async move {
                    match handle.await {
                        Ok(result) => result,
                        Err(join_error) => PlaybackResult::Failed(PlaybackFailure::new(
                            PlaybackError::AttemptAborted {
                                reason: join_error.to_string(),
                            },
                            "Playback error: session task ended unexpectedly",
                        )),
                    }
                }
                .boxed()
                .shared()
            })
            .clone()
    }

    /// Whether the session has not finished yet.
    pub fn is_active(&self) -> bool {
        !self.inner.is_finished()
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// True only for an unfinished session whose signature equals `signature`.
    pub fn matches_signature(&self, signature: &str) -> bool {
        !signature.is_empty() && self.is_active() && self.inner.signature.as_str() == signature
    }

    pub fn result(&self) -> PlaybackResult {
        self.inner.result.lock().clone()
    }

    pub fn config(&self) -> &TorrentPlaybackConfig {
        &self.inner.config
    }

    /// Validated magnet the torrent attempt would use.
    pub fn magnet_for_playback(&self) -> Option<&str> {
        self.inner.magnet_for_playback.as_deref()
    }

    pub fn fallback_magnet(&self) -> Option<&str> {
        self.inner.fallback_magnet.as_deref()
    }

    pub fn phase(&self) -> SessionPhase {
        *self.inner.phase.lock()
    }

    /// Surface the session is playing into, once prepared.
    pub fn surface(&self) -> Option<Arc<dyn PlaybackSurface>> {
        self.inner.active_surface()
    }

    /// Listens to every session event.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    /// Listens to one kind of session event.
    pub fn on<F>(&self, kind: SessionEventKind, listener: F) -> SubscriptionId
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        self.inner.events.subscribe(move |event| {
            if event.kind() == kind {
                listener(event);
            }
        })
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    pub fn cleanup_watchdog(&self) {
        self.inner.cleanup_watchdog();
    }
}

impl fmt::Debug for PlaybackSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackSession")
            .field("id", &self.inner.id)
            .field("signature", &self.inner.signature)
            .field("phase", &self.phase())
            .finish()
    }
}

impl SessionInner {
    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    fn emit(&self, event: SessionEvent) {
        self.events.emit(&event);
    }

    fn emit_status(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::debug!(session = %self.id, %message, "Status");
        self.emit(SessionEvent::Status { message });
    }

    fn dispatch(&self, event: AnalyticsEvent) {
        self.context.dispatch_analytics(&event);
    }

    fn transition(&self, next: SessionPhase) {
        let mut phase = self.phase.lock();
        match phase.advance(next) {
            Some(advanced) => *phase = advanced,
            None => tracing::warn!(
                session = %self.id,
                from = ?*phase,
                to = ?next,
                "Ignoring invalid session phase transition"
            ),
        }
    }

    fn stall_timeout(&self) -> Duration {
        self.context.stall_timeout
    }

    fn active_surface(&self) -> Option<Arc<dyn PlaybackSurface>> {
        self.active_surface.lock().clone()
    }

    fn url_allowed(&self) -> bool {
        !self.request.url().is_empty()
            && self.request.forced_source() != Some(SourceKind::Torrent)
    }

    fn torrent_allowed(&self) -> bool {
        self.magnet_for_playback.is_some()
            && self.request.forced_source() != Some(SourceKind::Url)
    }

    /// Claims the right to publish `source` as the session's result.
    ///
    /// Fails once `cancel` has fired or another attempt already won. The token
    /// is checked under the same lock [`Self::abandon_attempt`] cancels under.
    fn claim_winner(&self, source: SourceKind, cancel: &CancellationToken) -> bool {
        let mut slot = self.winner.lock();
        if cancel.is_cancelled() {
            return false;
        }
        match *slot {
            WinnerSlot::Open => {
                *slot = WinnerSlot::Claimed(source);
                true
            }
            WinnerSlot::Claimed(_) | WinnerSlot::Closed => false,
        }
    }

    /// Cancels a raced attempt unless it already claimed the win for `source`.
    ///
    /// Returns true when the attempt won; the caller must await its outcome.
    fn abandon_attempt(&self, source: SourceKind, cancel: &CancellationToken) -> bool {
        let slot = self.winner.lock();
        match *slot {
            WinnerSlot::Claimed(winner) if winner == source => true,
            WinnerSlot::Open | WinnerSlot::Claimed(_) | WinnerSlot::Closed => {
                cancel.cancel();
                false
            }
        }
    }

    /// Replaces the session's watchdog. Ignored once the session has finished.
    fn register_watchdog(&self, surface: &Arc<dyn PlaybackSurface>, options: WatchdogOptions) {
        if self.is_finished() {
            tracing::debug!(session = %self.id, "Session finished; watchdog not registered");
            return;
        }
        self.cleanup_watchdog();
        let guard = self.context.watchdogs.register(Some(surface), options);
        *self.watchdog.lock() = Some(guard);
    }

    /// Changes the live watchdog's stall window. False if there is none.
    fn set_watchdog_stall(&self, stall: Duration) -> bool {
        self.watchdog
            .lock()
            .as_ref()
            .is_some_and(|guard| guard.set_stall(stall))
    }

    fn cleanup_watchdog(&self) {
        let guard = self.watchdog.lock().take();
        if let Some(guard) = guard {
            guard.cleanup();
        }
    }

    fn attach_debug_listener(&self, surface: &Arc<dyn PlaybackSurface>) {
        let task = spawn_debug_listener(Arc::clone(surface), self.id);
        let previous = self.debug_listener.lock().replace(task);
        drop(previous);
    }

    fn cleanup_debug_listener(&self) {
        let task = self.debug_listener.lock().take();
        drop(task);
    }

    fn cleanup_live_listener(&self) {
        let task = self.live_listener.lock().take();
        drop(task);
    }

    fn reset_surface_source(&self, surface: &Arc<dyn PlaybackSurface>) {
        call_isolated("surface.pause", || surface.pause());
        call_isolated("surface.clear_source", || surface.clear_source());
    }

    async fn execute(self: Arc<Self>) -> PlaybackResult {
        self.transition(SessionPhase::Running);

        let detail = SessionStartDetail {
            url_provided: !self.request.url().is_empty(),
            magnet_provided: self.config.provided,
            magnet_usable: self.magnet_for_playback.is_some(),
        };
        tracing::info!(
            session = %self.id,
            url_provided = detail.url_provided,
            magnet_provided = detail.magnet_provided,
            magnet_usable = detail.magnet_usable,
            forced_source = ?self.request.forced_source(),
            "Playback session started"
        );
        self.dispatch(AnalyticsEvent::SessionStart(detail));
        self.emit(SessionEvent::SessionStart(detail));

        let result = match self.run().await {
            Ok(result) => result,
            Err(error) => self.orchestration_failure(error),
        };
        self.finish(result)
    }

    async fn run(self: &Arc<Self>) -> Result<PlaybackResult, PlaybackError> {
        let hooks = Arc::clone(&self.collaborators.hooks);
        await_isolated("hooks.wait_for_prior_teardown", hooks.wait_for_prior_teardown()).await;
        call_isolated("hooks.cancel_pending_telemetry", || {
            hooks.cancel_pending_telemetry()
        });

        let surface = self
            .collaborators
            .surface
            .clone()
            .ok_or(PlaybackError::SurfaceNotReady)?;

        await_isolated("hooks.show_loading_affordance", hooks.show_loading_affordance()).await;
        self.emit_status("Preparing video...");
        call_isolated("hooks.clear_timers", || hooks.clear_timers());
        self.context.prepare_surface(surface.as_ref());
        self.context.cleanup_p2p_engine().await;

        let surface = call_isolated("hooks.reset_surface", || {
            hooks.reset_surface(Arc::clone(&surface))
        })
        .unwrap_or(surface);
        *self.active_surface.lock() = Some(Arc::clone(&surface));
        self.emit(SessionEvent::VideoPrepared {
            surface: surface.id(),
        });
        self.emit(SessionEvent::ViewLoggingRequest {
            surface: surface.id(),
        });
        self.attach_debug_listener(&surface);

        let forced = self.request.forced_source();
        let try_url_first = match forced {
            Some(SourceKind::Url) => true,
            Some(SourceKind::Torrent) => false,
            None => self.context.playback.url_first_enabled,
        };
        let effective_timeout = if forced.is_some() {
            Duration::ZERO
        } else {
            self.start_timeout
        };
        let has_url = !self.request.url().is_empty();

        if try_url_first {
            let reason = if has_url {
                match self.race_hosted(&surface, effective_timeout).await? {
                    HostedOutcome::Playing => return Ok(PlaybackResult::Url),
                    HostedOutcome::Fallback(reason) => reason,
                    HostedOutcome::Superseded => FallbackReason::Timeout,
                }
            } else {
                FallbackReason::UrlMissing
            };

            if self.torrent_allowed() {
                let unbounded = CancellationToken::new();
                if let Some(handle) = self.attempt_torrent(reason, &unbounded).await? {
                    return Ok(PlaybackResult::Torrent(handle));
                }
            }
        } else {
            if self.magnet_for_playback.is_some() {
                if let Some(handle) = self.race_torrent(&surface, effective_timeout).await {
                    return Ok(PlaybackResult::Torrent(handle));
                }
            }

            if self.url_allowed() {
                let outcome = Arc::clone(self)
                    .attempt_hosted(Arc::clone(&surface), CancellationToken::new())
                    .await;
                if matches!(outcome, HostedOutcome::Playing) {
                    return Ok(PlaybackResult::Url);
                }
            }
        }

        Ok(self.no_source_failure())
    }

    /// Runs the hosted attempt as a task raced against `limit`.
    async fn race_hosted(
        self: &Arc<Self>,
        surface: &Arc<dyn PlaybackSurface>,
        limit: Duration,
    ) -> Result<HostedOutcome, PlaybackError> {
        let cancel = CancellationToken::new();
        let mut attempt =
            tokio::spawn(Arc::clone(self).attempt_hosted(Arc::clone(surface), cancel.clone()));

        let raced = with_timeout(&mut attempt, limit).label("hosted").run().await;
        let settled = match raced {
            Raced::Settled(settled) => settled,
            Raced::TimedOut if self.abandon_attempt(SourceKind::Url, &cancel) => {
                tracing::debug!(session = %self.id, "Hosted attempt won as the start timeout fired");
                attempt.await
            }
            Raced::TimedOut => {
                self.teardown_hosted(surface);
                return Ok(HostedOutcome::Fallback(FallbackReason::Timeout));
            }
        };

        match settled {
            Ok(outcome) => {
                if !matches!(outcome, HostedOutcome::Playing) {
                    self.teardown_hosted(surface);
                }
                Ok(outcome)
            }
            Err(join_error) => {
                self.teardown_hosted(surface);
                Err(PlaybackError::AttemptAborted {
                    reason: join_error.to_string(),
                })
            }
        }
    }

    /// Runs the torrent attempt as a task raced against `limit`.
    ///
    /// Failures and timeouts release the P2P engine and reset the surface so
    /// the hosted attempt starts clean.
    async fn race_torrent(
        self: &Arc<Self>,
        surface: &Arc<dyn PlaybackSurface>,
        limit: Duration,
    ) -> Option<TorrentHandle> {
        let cancel = CancellationToken::new();
        let mut attempt = tokio::spawn({
            let session = Arc::clone(self);
            let cancel = cancel.clone();
            async move {
                session
                    .attempt_torrent(FallbackReason::Preference, &cancel)
                    .await
            }
        });

        let raced = with_timeout(&mut attempt, limit).label("torrent").run().await;
        let settled = match raced {
            Raced::Settled(settled) => Some(settled),
            Raced::TimedOut if self.abandon_attempt(SourceKind::Torrent, &cancel) => {
                Some(attempt.await)
            }
            Raced::TimedOut => None,
        };

        match settled {
            Some(Ok(Ok(Some(handle)))) => return Some(handle),
            Some(Ok(Ok(None))) => {}
            Some(Ok(Err(error))) => {
                let message = match &error {
                    PlaybackError::P2p(p2p) => torrent_error_message(Some(p2p)),
                    other => other.to_string(),
                };
                tracing::warn!(
                    session = %self.id,
                    %error,
                    %message,
                    "Torrent playback failed; trying hosted URL"
                );
            }
            Some(Err(join_error)) => {
                tracing::warn!(
                    session = %self.id,
                    error = %join_error,
                    "Torrent attempt task ended unexpectedly"
                );
            }
            None => {
                tracing::info!(session = %self.id, "Torrent start timed out; trying hosted URL");
            }
        }

        self.context.cleanup_p2p_engine().await;
        self.reset_surface_source(surface);
        None
    }

    fn teardown_hosted(&self, surface: &Arc<dyn PlaybackSurface>) {
        self.cleanup_watchdog();
        self.cleanup_live_listener();
        self.reset_surface_source(surface);
    }

    fn no_source_failure(&self) -> PlaybackResult {
        let unsupported = self.config.provided && self.magnet_for_playback.is_none();
        let (error, message) = if unsupported {
            let message = self.context.playback.unsupported_magnet_message.clone();
            (
                PlaybackError::UnsupportedMagnet {
                    message: message.clone(),
                },
                message,
            )
        } else {
            (
                PlaybackError::NoSource {
                    message: NO_SOURCE_MESSAGE.to_string(),
                },
                NO_SOURCE_MESSAGE.to_string(),
            )
        };

        tracing::warn!(session = %self.id, unsupported, "No playable source");
        self.emit_status(message.clone());
        self.dispatch(AnalyticsEvent::SourceChange { source: None });
        self.emit(SessionEvent::SourceChange { source: None });
        self.publish_failure(error, message)
    }

    fn orchestration_failure(&self, error: PlaybackError) -> PlaybackResult {
        let message = format!("Playback error: {error}");
        tracing::error!(session = %self.id, %error, "Playback session failed");
        self.emit_status(message.clone());
        self.publish_failure(error, message)
    }

    fn publish_failure(&self, error: PlaybackError, message: String) -> PlaybackResult {
        let failure = PlaybackFailure::new(error, message.clone());
        self.dispatch(AnalyticsEvent::Error {
            message: message.clone(),
        });
        self.emit(SessionEvent::Error {
            error: Arc::clone(&failure.error),
            message,
        });
        PlaybackResult::Failed(failure)
    }

    /// Publishes the terminal result. The only writer of `result`.
    fn finish(&self, result: PlaybackResult) -> PlaybackResult {
        *self.winner.lock() = WinnerSlot::Closed;
        self.cleanup_watchdog();
        self.cleanup_live_listener();
        self.cleanup_debug_listener();

        *self.result.lock() = result.clone();
        self.transition(SessionPhase::for_result(&result));
        self.transition(SessionPhase::Finished);
        self.finished.store(true, Ordering::Release);

        tracing::info!(
            session = %self.id,
            source = ?result.source(),
            failed = result.error().is_some(),
            "Playback session finished"
        );
        self.emit(SessionEvent::Finished {
            result: result.clone(),
        });
        result
    }
}
