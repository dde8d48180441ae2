//! End-to-end playback scenarios under a paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio_test::{assert_err, assert_ok};
use undertow_core::config::{DEFAULT_UNSUPPORTED_MAGNET_MESSAGE, UndertowConfig};
use undertow_core::playback::{
    AUTOPLAY_PROMPT_MESSAGE, FallbackReason, NO_SOURCE_MESSAGE, P2pLauncher, PlaybackCoordinator,
    PlaybackRequest, PlaybackService, ProbeResult, SessionCollaborators, SessionEventKind,
    SourceKind, SurfaceEvent, UrlProber, WatchdogOptions,
};
use undertow_sim::{
    PlayScript, SAMPLE_MAGNET, SAMPLE_URL, ScriptedLauncher, ScriptedProbe, SimulatedSurface,
    builtin_scenarios, scenario_by_name,
};

async fn run(name: &str) -> undertow_sim::ScenarioReport {
    assert_ok!(scenario_by_name(name)).run().await
}

#[tokio::test(start_paused = true)]
async fn test_slow_probe_loses_start_race_to_torrent() {
    let report = run("timeout-fallback").await;

    assert_eq!(report.source, Some(SourceKind::Torrent));
    assert_eq!(report.launcher_calls, 1);
    assert_eq!(report.fallbacks, vec![FallbackReason::Timeout]);
    assert!(report.sources_loaded.is_empty());
    assert!(report.elapsed_ms < 200);
}

#[tokio::test(start_paused = true)]
async fn test_forced_url_ignores_start_timeout() {
    let report = run("forced-url").await;

    assert_eq!(report.source, Some(SourceKind::Url));
    assert_eq!(report.launcher_calls, 0);
    assert!(report.elapsed_ms >= 200);
    assert_eq!(report.sources_loaded, vec![SAMPLE_URL.to_string()]);
    assert_eq!(report.count(SessionEventKind::PosterRemove), 1);
}

#[tokio::test(start_paused = true)]
async fn test_forced_url_with_bad_probe_has_no_source() {
    let report = run("forced-url-bad-probe").await;

    assert_eq!(report.source, None);
    assert_eq!(report.launcher_calls, 0);
    assert_eq!(report.error.as_deref(), Some(NO_SOURCE_MESSAGE));
    assert!(report.statuses.contains(&"Hosted URL not found (404).".to_string()));
    assert!(report.sources_loaded.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_torrent_first_never_probes() {
    let report = run("torrent-first").await;

    assert_eq!(report.source, Some(SourceKind::Torrent));
    assert_eq!(report.probe_calls, 0);
    assert_eq!(report.launcher_calls, 1);
    assert_eq!(report.fallbacks, vec![FallbackReason::Preference]);
    assert_eq!(
        report.info_hash.as_deref(),
        Some("dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c")
    );
    assert_eq!(
        report.hooks,
        vec![
            "wait_for_prior_teardown",
            "cancel_pending_telemetry",
            "show_loading_affordance",
            "clear_timers",
            "reset_surface",
            "autoplay",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_rejected_torrent_falls_back_to_hosted_url() {
    let report = run("torrent-first-fallback").await;

    assert_eq!(report.source, Some(SourceKind::Url));
    assert_eq!(report.launcher_calls, 1);
    assert_eq!(report.probe_calls, 1);
    assert_eq!(report.sources_loaded, vec![SAMPLE_URL.to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_silent_stream_is_caught_by_watchdog() {
    let report = run("stall-fallback").await;

    assert_eq!(report.source, Some(SourceKind::Torrent));
    assert_eq!(report.fallbacks, vec![FallbackReason::Stall]);
    assert!(report.elapsed_ms >= 1000);
    assert!(report.elapsed_ms < 5000);
}

#[tokio::test(start_paused = true)]
async fn test_play_rejection_falls_back_immediately() {
    let report = run("play-error").await;

    assert_eq!(report.source, Some(SourceKind::Torrent));
    assert_eq!(report.fallbacks, vec![FallbackReason::PlayError]);
    assert!(report.elapsed_ms < 100);
}

#[tokio::test(start_paused = true)]
async fn test_blocked_autoplay_waits_for_user() {
    let report = run("autoplay-blocked").await;

    assert_eq!(report.source, Some(SourceKind::Url));
    assert_eq!(report.launcher_calls, 0);
    assert!(report.fallbacks.is_empty());
    assert!(report.elapsed_ms >= 2000);
    assert!(report.count(SessionEventKind::AutoplayBlocked) >= 1);
    assert!(report.statuses.contains(&AUTOPLAY_PROMPT_MESSAGE.to_string()));
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_magnet_reports_configured_message() {
    let report = run("unsupported-magnet").await;

    assert_eq!(report.source, None);
    assert_eq!(report.launcher_calls, 0);
    assert_eq!(report.error.as_deref(), Some(DEFAULT_UNSUPPORTED_MAGNET_MESSAGE));
}

#[tokio::test(start_paused = true)]
async fn test_every_scenario_finishes_exactly_once() {
    for scenario in builtin_scenarios() {
        let report = scenario.run().await;

        assert_eq!(
            report.count(SessionEventKind::Finished),
            1,
            "scenario {}",
            report.name
        );
        assert_eq!(report.events.last(), Some(&"finished"), "scenario {}", report.name);
        assert_eq!(report.events.first(), Some(&"session-start"), "scenario {}", report.name);
        assert!(
            report.source.is_some() != report.error.is_some(),
            "scenario {} must end with exactly one of source or error",
            report.name
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_report_json_uses_camel_case_fields() {
    let report = run("torrent-first").await;

    let json = assert_ok!(report.to_json());
    let value: serde_json::Value = assert_ok!(serde_json::from_str(&json));

    assert_eq!(value["name"], "torrent-first");
    assert_eq!(value["source"], "torrent");
    assert_eq!(value["launcherCalls"], 1);
    assert_eq!(value["probeCalls"], 0);
    assert_eq!(value["infoHash"], "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c");
    assert_eq!(value["fallbacks"][0], "preference");
    assert_eq!(value["events"][0], "session-start");
}

#[test]
fn test_unknown_scenario_is_rejected() {
    let error = assert_err!(scenario_by_name("does-not-exist"));
    assert!(error.to_string().contains("does-not-exist"));
}

#[tokio::test(start_paused = true)]
async fn test_coordinator_coalesces_identical_requests() {
    let coordinator =
        PlaybackCoordinator::new(Arc::new(PlaybackService::new(&UndertowConfig::for_testing())));
    let surface = SimulatedSurface::new(PlayScript::StartAfter(Duration::from_millis(50)));
    let probe = Arc::new(ScriptedProbe::new(ProbeResult::good(200)));
    let launcher = Arc::new(ScriptedLauncher::succeeding());
    let collaborators = SessionCollaborators::new(surface.as_surface())
        .with_prober(Arc::clone(&probe) as Arc<dyn UrlProber>)
        .with_launcher(Arc::clone(&launcher) as Arc<dyn P2pLauncher>);
    let request = PlaybackRequest::new(SAMPLE_URL, SAMPLE_MAGNET);

    let (first, second) = tokio::join!(
        coordinator.play(request.clone(), collaborators.clone()),
        coordinator.play(request.clone(), collaborators.clone()),
    );

    assert_eq!(first.source(), Some(SourceKind::Url));
    assert_eq!(second.source(), Some(SourceKind::Url));
    assert_eq!(probe.calls(), 1);
    assert_eq!(surface.play_calls(), 1);
    assert_eq!(coordinator.play_source(), Some(SourceKind::Url));
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_progress_postpones_stall() {
    let service = PlaybackService::builder()
        .stall_timeout(Duration::from_millis(500))
        .build();
    let surface = SimulatedSurface::new(PlayScript::Manual);
    let (tx, rx) = oneshot::channel();
    let started = tokio::time::Instant::now();

    let _guard = service.register_watchdog(
        Some(&surface.as_surface()),
        WatchdogOptions::new(service.stall_timeout()).on_fallback(move |reason| {
            let _ = tx.send((reason, started.elapsed()));
        }),
    );
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(400)).await;
        surface.emit(SurfaceEvent::TimeUpdate);
    }

    let (reason, elapsed) = rx.await.unwrap();
    assert_eq!(reason, FallbackReason::Stall);
    assert!(elapsed >= Duration::from_millis(2100));
}

#[tokio::test(start_paused = true)]
async fn test_watchdog_reports_media_error_immediately() {
    let service = PlaybackService::new(&UndertowConfig::default());
    let surface = SimulatedSurface::new(PlayScript::Manual);
    let (tx, rx) = oneshot::channel();

    let _guard = service.register_watchdog(
        Some(&surface.as_surface()),
        WatchdogOptions::new(service.stall_timeout()).on_fallback(move |reason| {
            let _ = tx.send(reason);
        }),
    );
    surface.emit(SurfaceEvent::Error);

    assert_eq!(rx.await.unwrap(), FallbackReason::Error);
}
