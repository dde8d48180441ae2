//! Hosted URL attempt: probe, load, play, and wait for the watchdog verdict.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use super::SessionInner;
use crate::playback::analytics::AnalyticsEvent;
use crate::playback::error::PlayError;
use crate::playback::events::SessionEvent;
use crate::playback::failure::{
    AUTOPLAY_PROMPT_MESSAGE, HOSTED_URL_SUCCESS_MESSAGE, hosted_failure_details,
    play_error_message,
};
use crate::playback::listeners::{ListenerTask, spawn_live_listener};
use crate::playback::surface::{PlaybackSurface, SurfaceEvent};
use crate::playback::types::{FallbackReason, ProbeResult, SourceKind};
use crate::playback::watchdog::WatchdogOptions;

/// How a hosted attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum HostedOutcome {
    Playing,
    Fallback(FallbackReason),
    /// The attempt lost its race and published nothing
    Superseded,
}

#[derive(Debug)]
enum Verdict {
    Success,
    Fallback(FallbackReason),
}

/// Shared state of one in-flight `play()` and its watchdog.
struct HostedAttempt {
    session: Arc<SessionInner>,
    surface: Arc<dyn PlaybackSurface>,
    resolver: Mutex<Option<oneshot::Sender<Verdict>>>,
    autoplay_blocked: AtomicBool,
    gesture_listener: Mutex<Option<ListenerTask>>,
}

impl SessionInner {
    pub(super) async fn attempt_hosted(
        self: Arc<Self>,
        surface: Arc<dyn PlaybackSurface>,
        cancel: CancellationToken,
    ) -> HostedOutcome {
        let url = self.request.url().to_string();
        if url.is_empty() {
            return HostedOutcome::Fallback(FallbackReason::UrlUnavailable);
        }

        self.emit_status("Checking hosted URL...");
        let snapshot = surface.snapshot();
        tracing::debug!(
            session = %self.id,
            %url,
            ready_state = ?snapshot.ready_state,
            network_state = snapshot.network_state,
            "Attempting hosted playback"
        );
        self.attach_live_listener(&surface);

        let probe = match &self.collaborators.prober {
            Some(prober) => prober.probe(&url).await,
            None => ProbeResult::error("no URL prober configured"),
        };
        if cancel.is_cancelled() {
            tracing::debug!(session = %self.id, "Hosted attempt superseded while probing");
            return HostedOutcome::Superseded;
        }

        if !probe.outcome.allows_playback() {
            let details = hosted_failure_details(&probe);
            tracing::warn!(
                session = %self.id,
                outcome = ?probe.outcome,
                status = ?probe.status,
                error = ?probe.error,
                category = ?details.category,
                "Hosted URL probe failed; skipping play()"
            );
            self.emit_status(details.message);
            self.cleanup_live_listener();
            self.cleanup_debug_listener();
            return HostedOutcome::Fallback(FallbackReason::ProbeFailed);
        }

        let (resolver, verdict) = oneshot::channel();
        let attempt = Arc::new(HostedAttempt {
            session: Arc::clone(&self),
            surface: Arc::clone(&surface),
            resolver: Mutex::new(Some(resolver)),
            autoplay_blocked: AtomicBool::new(false),
            gesture_listener: Mutex::new(None),
        });
        attempt.arm_watchdog(self.stall_timeout());
        surface.set_source(&url);

        let Some(verdict) = attempt.drive(verdict, &cancel).await else {
            tracing::debug!(session = %self.id, "Hosted attempt superseded during play()");
            return HostedOutcome::Superseded;
        };

        match verdict {
            Verdict::Success => {
                if !self.claim_winner(SourceKind::Url, &cancel) {
                    tracing::debug!(
                        session = %self.id,
                        "Hosted playback started after losing its race; not publishing"
                    );
                    return HostedOutcome::Superseded;
                }
                self.emit(SessionEvent::PosterRemove {
                    reason: "http-success".to_string(),
                });
                self.dispatch(AnalyticsEvent::SourceChange {
                    source: Some(SourceKind::Url),
                });
                self.emit(SessionEvent::SourceChange {
                    source: Some(SourceKind::Url),
                });
                self.cleanup_live_listener();
                self.cleanup_debug_listener();
                tracing::info!(session = %self.id, %url, "Hosted playback started");
                HostedOutcome::Playing
            }
            Verdict::Fallback(reason) => {
                tracing::info!(session = %self.id, %reason, "Hosted playback falling back");
                HostedOutcome::Fallback(reason)
            }
        }
    }

    fn attach_live_listener(self: &Arc<Self>, surface: &Arc<dyn PlaybackSurface>) {
        let session = Arc::downgrade(self);
        let task = spawn_live_listener(Arc::clone(surface), move || {
            if let Some(session) = session.upgrade() {
                session.emit_status(HOSTED_URL_SUCCESS_MESSAGE);
            }
        });
        let previous = self.live_listener.lock().replace(task);
        drop(previous);
    }
}

impl HostedAttempt {
    /// Resolves the attempt. Later calls are ignored.
    fn resolve(&self, verdict: Verdict) {
        let resolver = self.resolver.lock().take();
        if let Some(resolver) = resolver {
            let _ = resolver.send(verdict);
        }
    }

    fn arm_watchdog(self: &Arc<Self>, stall: Duration) {
        let on_success = {
            let attempt = Arc::downgrade(self);
            move || {
                if let Some(attempt) = attempt.upgrade() {
                    attempt.resolve(Verdict::Success);
                }
            }
        };
        let on_fallback = {
            let attempt = Arc::downgrade(self);
            move |reason| {
                if let Some(attempt) = attempt.upgrade() {
                    attempt.handle_watchdog_fallback(reason);
                }
            }
        };
        self.session.register_watchdog(
            &self.surface,
            WatchdogOptions::new(stall)
                .on_success(on_success)
                .on_fallback(on_fallback),
        );
    }

    /// Calls `play()` and waits for the watchdog verdict or cancellation.
    async fn drive(
        self: &Arc<Self>,
        mut verdict: oneshot::Receiver<Verdict>,
        cancel: &CancellationToken,
    ) -> Option<Verdict> {
        let play = {
            let attempt = Arc::clone(self);
            async move {
                if let Err(error) = attempt.surface.play().await {
                    attempt.handle_play_rejection(error);
                }
            }
        };
        tokio::pin!(play);
        let mut play_settled = false;

        loop {
            tokio::select! {
                received = &mut verdict => {
                    return Some(received.unwrap_or(Verdict::Fallback(FallbackReason::WatchdogTriggered)));
                }
                () = cancel.cancelled() => return None,
                () = &mut play, if !play_settled => play_settled = true,
            }
        }
    }

    fn handle_play_rejection(self: &Arc<Self>, error: PlayError) {
        if !error.is_autoplay_block() {
            tracing::warn!(
                session = %self.session.id,
                %error,
                message = play_error_message(&error),
                "Direct URL playback failed"
            );
            self.resolve(Verdict::Fallback(FallbackReason::PlayError));
            return;
        }

        tracing::info!(session = %self.session.id, %error, "Autoplay blocked; waiting for user gesture");
        self.enter_degraded_mode("not-allowed");
        self.listen_for_gesture();
    }

    fn handle_watchdog_fallback(self: &Arc<Self>, reason: FallbackReason) {
        if reason == FallbackReason::Stall && self.autoplay_blocked.load(Ordering::Acquire) {
            tracing::debug!(session = %self.session.id, "Stall while autoplay is blocked; staying on hosted URL");
            self.enter_degraded_mode(reason.as_str());
            return;
        }
        self.resolve(Verdict::Fallback(reason));
    }

    /// Keeps error and success detection live but stops counting stalls.
    fn enter_degraded_mode(self: &Arc<Self>, reason: &str) {
        self.autoplay_blocked.store(true, Ordering::Release);
        self.session.emit_status(AUTOPLAY_PROMPT_MESSAGE);
        self.session.emit(SessionEvent::AutoplayBlocked {
            reason: reason.to_string(),
        });
        if !self.session.set_watchdog_stall(Duration::ZERO) {
            self.arm_watchdog(Duration::ZERO);
        }
    }

    /// Re-arms the normal stall window on the first user-initiated `play`.
    fn listen_for_gesture(self: &Arc<Self>) {
        let mut events = self.surface.subscribe();
        let attempt = Arc::downgrade(self);
        let task = ListenerTask::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SurfaceEvent::Play) => break,
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return,
                }
            }
            let Some(attempt) = attempt.upgrade() else {
                return;
            };
            tracing::debug!(session = %attempt.session.id, "User started playback; re-arming watchdog");
            attempt.autoplay_blocked.store(false, Ordering::Release);
            let stall = attempt.session.stall_timeout();
            if !attempt.session.set_watchdog_stall(stall) {
                attempt.arm_watchdog(stall);
            }
        });
        let previous = self.gesture_listener.lock().replace(task);
        drop(previous);
    }
}
