//! Scripted probe, P2P launcher, engine and hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use undertow_core::magnet::extract_info_hash;
use undertow_core::playback::{
    P2pEngine, P2pError, P2pLauncher, P2pStartOptions, PlaybackSurface, ProbeResult, SessionHooks,
    TorrentHandle, UrlProber,
};

/// Probe that answers with a fixed result after a delay.
#[derive(Debug)]
pub struct ScriptedProbe {
    result: ProbeResult,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(result: ProbeResult) -> Self {
        Self {
            result,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UrlProber for ScriptedProbe {
    async fn probe(&self, url: &str) -> ProbeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(%url, delay_ms = self.delay.as_millis() as u64, "Scripted probe");
        tokio::time::sleep(self.delay).await;
        self.result.clone()
    }
}

/// One recorded call to [`ScriptedLauncher::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRecord {
    pub magnet: String,
    pub options: P2pStartOptions,
}

/// P2P launcher that succeeds or fails after a delay.
#[derive(Debug)]
pub struct ScriptedLauncher {
    failure: Option<P2pError>,
    delay: Duration,
    launches: Mutex<Vec<LaunchRecord>>,
}

impl ScriptedLauncher {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            delay: Duration::ZERO,
            launches: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: P2pError) -> Self {
        Self {
            failure: Some(error),
            ..Self::succeeding()
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.launches.lock().len()
    }

    pub fn launches(&self) -> Vec<LaunchRecord> {
        self.launches.lock().clone()
    }
}

#[async_trait]
impl P2pLauncher for ScriptedLauncher {
    async fn start(
        &self,
        magnet: &str,
        options: P2pStartOptions,
    ) -> Result<TorrentHandle, P2pError> {
        self.launches.lock().push(LaunchRecord {
            magnet: magnet.to_string(),
            options,
        });
        tokio::time::sleep(self.delay).await;

        if let Some(error) = &self.failure {
            tracing::debug!(%error, "Scripted launcher rejecting torrent");
            return Err(error.clone());
        }
        let info_hash = extract_info_hash(magnet).map_err(|e| P2pError::StartFailed {
            reason: e.to_string(),
        })?;
        Ok(TorrentHandle {
            info_hash,
            name: Some("simulated-stream".to_string()),
        })
    }
}

/// Engine counting cleanups; can be made to fail them.
#[derive(Debug, Default)]
pub struct SimulatedEngine {
    cleanups: AtomicUsize,
    failure: Option<P2pError>,
}

impl SimulatedEngine {
    pub fn failing(error: P2pError) -> Self {
        Self {
            cleanups: AtomicUsize::new(0),
            failure: Some(error),
        }
    }

    pub fn cleanups(&self) -> usize {
        self.cleanups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl P2pEngine for SimulatedEngine {
    async fn cleanup(&self) -> Result<(), P2pError> {
        self.cleanups.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Session hooks that record the order they ran in.
#[derive(Debug, Default)]
pub struct HookRecorder {
    calls: Mutex<Vec<&'static str>>,
}

impl HookRecorder {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, hook: &'static str) {
        self.calls.lock().push(hook);
    }
}

#[async_trait]
impl SessionHooks for HookRecorder {
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
