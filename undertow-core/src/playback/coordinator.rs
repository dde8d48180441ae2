//! Request-level front door for playback.
//!
//! The coordinator coalesces identical in-flight requests onto one session and
//! remembers which source family played last, so switching from a torrent back
//! to a hosted URL releases the P2P engine first.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use super::collaborators::SessionCollaborators;
use super::events::{SessionEvent, SessionEventKind, SubscriptionId};
use super::service::PlaybackService;
use super::session::{PlaybackSession, SessionStart};
use super::surface::PlaybackSurface;
use super::types::{PlaybackRequest, PlaybackResult, RequestSignature, SourceKind};

struct ActivePlayback {
    session: PlaybackSession,
    surface: Option<Arc<dyn PlaybackSurface>>,
    start: SessionStart,
}

impl ActivePlayback {
    fn serves(&self, signature: &RequestSignature) -> bool {
        self.session.matches_signature(signature.as_str())
            && self
                .surface
                .as_ref()
                .is_some_and(|surface| surface.is_connected())
    }
}

enum Admission {
    Joined(SessionStart),
    Created {
        session: PlaybackSession,
        start: SessionStart,
        subscriptions: Vec<SubscriptionId>,
    },
}

#[derive(Default)]
struct CoordinatorState {
    active: Mutex<Option<ActivePlayback>>,
    play_source: Mutex<Option<SourceKind>>,
}

impl CoordinatorState {
    fn coalesce(&self, signature: &RequestSignature) -> Option<SessionStart> {
        let active = self.active.lock();
        let active = active.as_ref().filter(|active| active.serves(signature))?;
        tracing::debug!(
            session = %active.session.id(),
            "Coalescing identical playback request onto active session"
        );
        Some(active.start.clone())
    }
}

/// Runs playback requests through a [`PlaybackService`].
#[derive(Clone)]
pub struct PlaybackCoordinator {
    service: Arc<PlaybackService>,
    state: Arc<CoordinatorState>,
}

impl PlaybackCoordinator {
    pub fn new(service: Arc<PlaybackService>) -> Self {
        Self {
            service,
            state: Arc::new(CoordinatorState::default()),
        }
    }

    pub fn service(&self) -> &Arc<PlaybackService> {
        &self.service
    }

    /// Plays `request`, joining the active session if it serves the same request.
    pub async fn play(
        &self,
        request: PlaybackRequest,
        collaborators: SessionCollaborators,
    ) -> PlaybackResult {
        let signature = request.signature();
        if let Some(start) = self.state.coalesce(&signature) {
            return start.await;
        }

        let switching_from_torrent = *self.state.play_source.lock() == Some(SourceKind::Torrent);
        if switching_from_torrent && !request.url().is_empty() {
            tracing::debug!("Leaving torrent playback; releasing P2P engine");
            self.service.cleanup_p2p_engine().await;
        }

        let (session, start, subscriptions) = match self.admit(&signature, request, collaborators) {
            Admission::Joined(start) => return start.await,
            Admission::Created {
                session,
                start,
                subscriptions,
            } => (session, start, subscriptions),
        };

        let result = start.await;
        for id in subscriptions {
            session.unsubscribe(id);
        }
        result
    }

    /// Joins the active session or creates and starts a new one, atomically.
    fn admit(
        &self,
        signature: &RequestSignature,
        request: PlaybackRequest,
        collaborators: SessionCollaborators,
    ) -> Admission {
        let mut active = self.state.active.lock();
        let joined = active
            .as_ref()
            .filter(|active| active.serves(signature))
            .map(|active| active.start.clone());
        if let Some(start) = joined {
            return Admission::Joined(start);
        }

        let surface = collaborators.surface.clone();
        let session = self.service.create_session(request, collaborators);
        *self.state.play_source.lock() = None;
        let subscriptions = self.track(&session);
        let start = session.start();
        *active = Some(ActivePlayback {
            session: session.clone(),
            surface,
            start: start.clone(),
        });
        Admission::Created {
            session,
            start,
            subscriptions,
        }
    }

    /// Source family of the most recent `sourcechange`.
    pub fn play_source(&self) -> Option<SourceKind> {
        *self.state.play_source.lock()
    }

    pub fn active_session(&self) -> Option<PlaybackSession> {
        self.state
            .active
            .lock()
            .as_ref()
            .map(|active| active.session.clone())
    }

    fn track(&self, session: &PlaybackSession) -> Vec<SubscriptionId> {
        let on_source = {
            let state: Weak<CoordinatorState> = Arc::downgrade(&self.state);
            session.on(SessionEventKind::SourceChange, move |event| {
                if let (Some(state), SessionEvent::SourceChange { source }) =
                    (state.upgrade(), event)
                {
                    *state.play_source.lock() = *source;
                }
            })
        };
        let on_finished = {
            let state = Arc::downgrade(&self.state);
            let id = session.id();
            session.on(SessionEventKind::Finished, move |_| {
                let Some(state) = state.upgrade() else {
                    return;
                };
                let mut active = state.active.lock();
                if active
                    .as_ref()
                    .is_some_and(|active| active.session.id() == id)
                {
                    *active = None;
                }
            })
        };
        vec![on_source, on_finished]
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::config::UndertowConfig;
    use crate::playback::collaborators::{P2pEngine, P2pLauncher, UrlProber};
    use crate::playback::test_mocks::{MockEngine, MockLauncher, MockProber, MockSurface, settle};
    use crate::playback::types::ProbeResult;

    const URL: &str = "https://cdn.example.com/video.mp4";
    const MAGNET: &str = "magnet:?xt=urn:btih:0123456789abcdef0123456789abcdef01234567";

    fn coordinator() -> PlaybackCoordinator {
        PlaybackCoordinator::new(Arc::new(PlaybackService::new(&UndertowConfig::for_testing())))
    }

    fn collaborators(
        surface: &Arc<MockSurface>,
        launcher: &Arc<MockLauncher>,
    ) -> SessionCollaborators {
        SessionCollaborators::new(surface.as_surface())
            .with_prober(MockProber::new(ProbeResult::good(200)) as Arc<dyn UrlProber>)
            .with_launcher(Arc::clone(launcher) as Arc<dyn P2pLauncher>)
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_concurrent_requests_share_one_session() {
        let coordinator = coordinator();
        let surface = MockSurface::new();
        let launcher = MockLauncher::delayed(Duration::from_millis(50));
        let request = PlaybackRequest::new("", MAGNET);

        let (first, second) = tokio::join!(
            coordinator.play(request.clone(), collaborators(&surface, &launcher)),
            coordinator.play(request.clone(), collaborators(&surface, &launcher)),
        );

        assert_eq!(first.source(), Some(SourceKind::Torrent));
        assert_eq!(second.source(), Some(SourceKind::Torrent));
        assert_eq!(launcher.calls(), 1);
        assert_eq!(coordinator.play_source(), Some(SourceKind::Torrent));
        assert!(coordinator.active_session().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnected_surface_starts_new_session() {
        let coordinator = coordinator();
        let surface = MockSurface::new();
        let launcher = MockLauncher::delayed(Duration::from_millis(50));
        let request = PlaybackRequest::new("", MAGNET);

        let (first, second) = tokio::join!(
            coordinator.play(request.clone(), collaborators(&surface, &launcher)),
            async {
                settle().await;
                surface.disconnect();
                coordinator
                    .play(request.clone(), collaborators(&surface, &launcher))
                    .await
            },
        );

        assert!(first.is_success());
        assert!(second.is_success());
        assert_eq!(launcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_session_is_not_reused() {
        let coordinator = coordinator();
        let surface = MockSurface::new();
        let launcher = MockLauncher::succeeding();
        let request = PlaybackRequest::new("", MAGNET);

        coordinator
            .play(request.clone(), collaborators(&surface, &launcher))
            .await;
        coordinator
            .play(request, collaborators(&surface, &launcher))
            .await;

        assert_eq!(launcher.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_from_torrent_to_url_releases_engine() {
        let engine = Arc::new(MockEngine::default());
        let service = PlaybackService::builder()
            .config(&UndertowConfig::for_testing())
            .p2p_engine(Arc::clone(&engine) as Arc<dyn P2pEngine>)
            .build();
        let coordinator = PlaybackCoordinator::new(Arc::new(service));
        let launcher = MockLauncher::succeeding();

        let torrent_surface = MockSurface::new();
        coordinator
            .play(
                PlaybackRequest::new("", MAGNET),
                collaborators(&torrent_surface, &launcher),
            )
            .await;
        let after_torrent = engine.cleanups();
        assert_eq!(coordinator.play_source(), Some(SourceKind::Torrent));

        let hosted_surface = MockSurface::playing();
        let result = coordinator
            .play(
                PlaybackRequest::new(URL, ""),
                collaborators(&hosted_surface, &launcher),
            )
            .await;

        assert!(matches!(result, PlaybackResult::Url));
        assert_eq!(engine.cleanups(), after_torrent + 2);
        assert_eq!(coordinator.play_source(), Some(SourceKind::Url));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_clears_play_source() {
        let coordinator = coordinator();
        let launcher = MockLauncher::succeeding();

        coordinator
            .play(
                PlaybackRequest::new("", MAGNET),
                collaborators(&MockSurface::new(), &launcher),
            )
            .await;
        let result = coordinator
            .play(
                PlaybackRequest::new("", ""),
                collaborators(&MockSurface::new(), &launcher),
            )
            .await;

        assert!(!result.is_success());
        assert_eq!(coordinator.play_source(), None);
    }
}
