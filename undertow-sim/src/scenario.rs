//! Playback scenarios: scripted collaborators wired into a real session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::time::Instant;
use undertow_core::config::UndertowConfig;
use undertow_core::playback::{
    FallbackReason, P2pEngine, P2pError, P2pLauncher, PlayError, PlaybackRequest, PlaybackResult,
    PlaybackService, ProbeResult, SessionCollaborators, SessionEvent, SessionEventKind,
    SessionHooks, SourceKind, UrlProber,
};

use crate::collaborators::{HookRecorder, ScriptedLauncher, ScriptedProbe, SimulatedEngine};
use crate::surface::{PlayScript, SimulatedSurface};

pub const SAMPLE_URL: &str = "https://cdn.example.com/media/big-buck-bunny.mp4";
pub const SAMPLE_MAGNET: &str = "magnet:?xt=urn:btih:dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";

/// Errors from looking up scenarios.
#[derive(Debug, thiserror::Error)]
pub enum ScenarioError {
    #[error("Unknown scenario: {name}")]
    Unknown { name: String },
}

/// Inputs and collaborator behavior for one simulated playback.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub description: String,
    pub url: String,
    pub magnet: String,
    pub forced_source: Option<SourceKind>,
    pub url_first: bool,
    pub start_timeout: Duration,
    pub stall_timeout: Duration,
    pub probe: ProbeResult,
    pub probe_delay: Duration,
    pub launch_failure: Option<P2pError>,
    pub launch_delay: Duration,
    pub play: PlayScript,
    /// Press play this long after autoplay is blocked
    pub user_play_after: Option<Duration>,
}

impl Scenario {
    /// Hosted URL and magnet both present, everything healthy.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            url: SAMPLE_URL.to_string(),
            magnet: SAMPLE_MAGNET.to_string(),
            forced_source: None,
            url_first: true,
            start_timeout: Duration::from_millis(100),
            stall_timeout: Duration::from_secs(8),
            probe: ProbeResult::good(200),
            probe_delay: Duration::ZERO,
            launch_failure: None,
            launch_delay: Duration::ZERO,
            play: PlayScript::StartAfter(Duration::from_millis(20)),
            user_play_after: None,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn magnet(mut self, magnet: impl Into<String>) -> Self {
        self.magnet = magnet.into();
        self
    }

    pub fn forced(mut self, source: SourceKind) -> Self {
        self.forced_source = Some(source);
        self
    }

    pub fn torrent_first(mut self) -> Self {
        self.url_first = false;
        self
    }

    pub fn start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn stall_timeout(mut self, stall: Duration) -> Self {
        self.stall_timeout = stall;
        self
    }

    pub fn probe(mut self, result: ProbeResult, delay: Duration) -> Self {
        self.probe = result;
        self.probe_delay = delay;
        self
    }

    pub fn launch_fails(mut self, error: P2pError) -> Self {
        self.launch_failure = Some(error);
        self
    }

    pub fn launch_delay(mut self, delay: Duration) -> Self {
        self.launch_delay = delay;
        self
    }

    pub fn play(mut self, script: PlayScript) -> Self {
        self.play = script;
        self
    }

    pub fn user_play_after(mut self, delay: Duration) -> Self {
        self.user_play_after = Some(delay);
        self
    }

    /// Runs the scenario through a fresh service and session.
    pub async fn run(&self) -> ScenarioReport {
        let engine = Arc::new(SimulatedEngine::default());
        let service = PlaybackService::builder()
            .config(&UndertowConfig::default())
            .url_first(self.url_first)
            .start_timeout(self.start_timeout)
            .stall_timeout(self.stall_timeout)
            .p2p_engine(Arc::clone(&engine) as Arc<dyn P2pEngine>)
            .build();

        let surface = SimulatedSurface::new(self.play.clone());
        let probe = Arc::new(ScriptedProbe::new(self.probe.clone()).with_delay(self.probe_delay));
        let launcher = match &self.launch_failure {
            Some(error) => ScriptedLauncher::failing(error.clone()),
            None => ScriptedLauncher::succeeding(),
        };
        let launcher = Arc::new(launcher.with_delay(self.launch_delay));
        let hooks = Arc::new(HookRecorder::default());

        let request =
            PlaybackRequest::new(&self.url, &self.magnet).with_forced_source(self.forced_source);
        let collaborators = SessionCollaborators::new(surface.as_surface())
            .with_hooks(Arc::clone(&hooks) as Arc<dyn SessionHooks>)
            .with_prober(Arc::clone(&probe) as Arc<dyn UrlProber>)
            .with_launcher(Arc::clone(&launcher) as Arc<dyn P2pLauncher>);
        let session = service.create_session(request, collaborators);

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session.subscribe(move |event: &SessionEvent| sink.lock().push(event.clone()));

        if let Some(delay) = self.user_play_after {
            let surface = Arc::clone(&surface);
            let pressed = AtomicBool::new(false);
            session.on(SessionEventKind::AutoplayBlocked, move |_| {
                if pressed.swap(true, Ordering::AcqRel) {
                    return;
                }
                let surface = Arc::clone(&surface);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    surface.user_play();
                });
            });
        }

        tracing::info!(scenario = %self.name, "Running playback scenario");
        let started = Instant::now();
        let result = session.start().await;
        let elapsed = started.elapsed();

        let events = events.lock().clone();
        ScenarioReport::new(
            &self.name,
            &result,
            &events,
            ScenarioCounters {
                probe_calls: probe.calls(),
                launcher_calls: launcher.calls(),
                engine_cleanups: engine.cleanups(),
                sources_loaded: surface.sources(),
                hooks: hooks.calls(),
            },
            elapsed,
        )
    }
}

struct ScenarioCounters {
    probe_calls: usize,
    launcher_calls: usize,
    engine_cleanups: usize,
    sources_loaded: Vec<String>,
    hooks: Vec<&'static str>,
}

/// What happened during a scenario run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioReport {
    pub name: String,
    pub source: Option<SourceKind>,
    pub error: Option<String>,
    pub info_hash: Option<String>,
    pub events: Vec<&'static str>,
    pub statuses: Vec<String>,
    pub fallbacks: Vec<FallbackReason>,
    pub probe_calls: usize,
    pub launcher_calls: usize,
    pub engine_cleanups: usize,
    pub sources_loaded: Vec<String>,
    pub hooks: Vec<&'static str>,
    pub elapsed_ms: u64,
}

impl ScenarioReport {
    fn new(
        name: &str,
        result: &PlaybackResult,
        events: &[SessionEvent],
        counters: ScenarioCounters,
        elapsed: Duration,
    ) -> Self {
        Self {
            name: name.to_string(),
            source: result.source(),
            error: result.error().map(|failure| failure.message.clone()),
            info_hash: result.torrent_handle().map(|handle| handle.info_hash.clone()),
            events: events.iter().map(|event| event.kind().as_str()).collect(),
            statuses: events
                .iter()
                .filter_map(|event| event.status_message().map(str::to_string))
                .collect(),
            fallbacks: events
                .iter()
                .filter_map(|event| match event {
                    SessionEvent::Fallback { reason } => Some(*reason),
                    _ => None,
                })
                .collect(),
            probe_calls: counters.probe_calls,
            launcher_calls: counters.launcher_calls,
            engine_cleanups: counters.engine_cleanups,
            sources_loaded: counters.sources_loaded,
            hooks: counters.hooks,
            elapsed_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Pretty-printed JSON form, as printed by `undertow simulate --json`.
    ///
    /// # Errors
    ///
    /// - `serde_json::Error` - If serialization fails
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Number of events of `kind` the session emitted.
    pub fn count(&self, kind: SessionEventKind) -> usize {
        self.events
            .iter()
            .filter(|name| **name == kind.as_str())
            .count()
    }
}

/// Every named scenario the CLI can run.
pub fn builtin_scenarios() -> Vec<Scenario> {
    vec![
        Scenario::new("timeout-fallback")
            .described("Slow probe loses the start race; torrent takes over")
            .probe(ProbeResult::good(200), Duration::from_millis(200)),
        Scenario::new("forced-url")
            .described("Forced hosted URL waits out a slow probe")
            .forced(SourceKind::Url)
            .probe(ProbeResult::good(200), Duration::from_millis(200)),
        Scenario::new("forced-url-bad-probe")
            .described("Forced hosted URL with a failing probe ends without a source")
            .forced(SourceKind::Url)
            .probe(ProbeResult::bad(404), Duration::ZERO),
        Scenario::new("torrent-first")
            .described("Torrent preferred and starts")
            .torrent_first(),
        Scenario::new("torrent-first-fallback")
            .described("Torrent preferred but rejected; hosted URL plays")
            .torrent_first()
            .launch_fails(P2pError::Unreachable {
                reason: "no peers responded".to_string(),
            }),
        Scenario::new("stall-fallback")
            .described("Hosted stream goes silent mid-start; watchdog falls back")
            .start_timeout(Duration::from_secs(5))
            .stall_timeout(Duration::from_secs(1))
            .play(PlayScript::StallAfterLoad),
        Scenario::new("play-error")
            .described("Hosted play() rejects with a network error")
            .play(PlayScript::Reject(PlayError::Network {
                message: "CORS request did not succeed".to_string(),
            })),
        Scenario::new("autoplay-blocked")
            .described("Autoplay is blocked until the user presses play")
            .forced(SourceKind::Url)
            .stall_timeout(Duration::from_secs(1))
            .play(PlayScript::BlockAutoplay)
            .user_play_after(Duration::from_secs(2)),
        Scenario::new("unsupported-magnet")
            .described("Only a v2-only magnet is provided")
            .url("")
            .magnet("magnet:?xt=urn:btmh:1220d2474e86c95b19b8bcfdb92bc12c9d44667cfa36d2474e86c95b19b8bcfdb92b"),
        Scenario::new("no-source")
            .described("Neither a hosted URL nor a magnet")
            .url("")
            .magnet(""),
    ]
}

/// Looks up a built-in scenario by name.
///
/// # Errors
///
/// - `ScenarioError::Unknown` - If no built-in scenario has that name
pub fn scenario_by_name(name: &str) -> Result<Scenario, ScenarioError> {
    builtin_scenarios()
        .into_iter()
        .find(|scenario| scenario.name == name)
        .ok_or_else(|| ScenarioError::Unknown {
            name: name.to_string(),
        })
}
