//! Consumer-supplied collaborators a session is wired with.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::error::P2pError;
use super::surface::PlaybackSurface;
use super::types::{ProbeResult, TorrentHandle};

/// Per-session UI hooks. Every method defaults to a no-op.
#[async_trait]
pub trait SessionHooks: Send + Sync {
    /// Waits for the previous session's teardown to finish.
    async fn wait_for_prior_teardown(&self) {}

    fn cancel_pending_telemetry(&self) {}

    fn clear_timers(&self) {}

    async fn show_loading_affordance(&self) {}

    /// Returns a pristine surface to play into. Defaults to reusing `surface`.
    fn reset_surface(&self, surface: Arc<dyn PlaybackSurface>) -> Arc<dyn PlaybackSurface> {
        surface
    }

    /// Called once torrent playback has started.
    fn autoplay(&self) {}
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl SessionHooks for NoopHooks {}

/// Checks whether a hosted URL is worth handing to the surface.
#[async_trait]
pub trait UrlProber: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeResult;
}

/// Extra inputs for starting a torrent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct P2pStartOptions {
    /// Minimal magnet to retry with if the augmented one fails
    pub fallback_magnet: Option<String>,
    /// HTTP mirrors of the content
    pub url_list: Vec<String>,
}

/// Starts torrent playback on the session's surface.
#[async_trait]
pub trait P2pLauncher: Send + Sync {
    /// # Errors
    /// - `P2pError` - Torrent could not be started
    async fn start(&self, magnet: &str, options: P2pStartOptions)
    -> Result<TorrentHandle, P2pError>;
}

/// Shared P2P engine, cleaned up before a new stream is acquired.
#[async_trait]
pub trait P2pEngine: Send + Sync {
    /// # Errors
    /// - `P2pError::CleanupFailed` - Previous stream could not be released
    async fn cleanup(&self) -> Result<(), P2pError>;
}

/// Everything a single session talks to besides the service.
#[derive(Clone)]
pub struct SessionCollaborators {
    pub surface: Option<Arc<dyn PlaybackSurface>>,
    pub hooks: Arc<dyn SessionHooks>,
    pub prober: Option<Arc<dyn UrlProber>>,
    pub launcher: Option<Arc<dyn P2pLauncher>>,
}

impl Default for SessionCollaborators {
    fn default() -> Self {
        Self {
            surface: None,
            hooks: Arc::new(NoopHooks),
            prober: None,
            launcher: None,
        }
    }
}

impl SessionCollaborators {
    pub fn new(surface: Arc<dyn PlaybackSurface>) -> Self {
        Self {
            surface: Some(surface),
            ..Default::default()
        }
    }

    pub fn with_hooks(mut self, hooks: Arc<dyn SessionHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn with_prober(mut self, prober: Arc<dyn UrlProber>) -> Self {
        self.prober = Some(prober);
        self
    }

    pub fn with_launcher(mut self, launcher: Arc<dyn P2pLauncher>) -> Self {
        self.launcher = Some(launcher);
        self
    }
}

impl fmt::Debug for SessionCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionCollaborators")
            .field("surface", &self.surface.as_ref().map(|s| s.id()))
            .field("prober", &self.prober.is_some())
            .field("launcher", &self.launcher.is_some())
            .finish()
    }
}
