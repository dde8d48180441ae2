//! Undertow Simulation - Deterministic playback scenarios
//!
//! Scripted stand-ins for everything a playback session talks to: a media
//! surface whose `play()` follows a [`PlayScript`], a probe and P2P launcher
//! with fixed answers and delays, and a recording engine and hook set. A
//! [`Scenario`] wires them into a real [`undertow_core::PlaybackService`] and
//! reports what the session did.
//!
//! Under a paused tokio clock every scenario is fully deterministic.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use undertow_core::playback::ProbeResult;
//! use undertow_sim::Scenario;
//!
//! # async fn run() {
//! let report = Scenario::new("slow-probe")
//!     .probe(ProbeResult::good(200), Duration::from_millis(200))
//!     .run()
//!     .await;
//! println!("{:?} after {} ms", report.source, report.elapsed_ms);
//! # }
//! ```

pub mod collaborators;
pub mod scenario;
pub mod surface;

pub use collaborators::{
    HookRecorder, LaunchRecord, ScriptedLauncher, ScriptedProbe, SimulatedEngine,
};
pub use scenario::{
    SAMPLE_MAGNET, SAMPLE_URL, Scenario, ScenarioError, ScenarioReport, builtin_scenarios,
    scenario_by_name,
};
pub use surface::{AUTOPLAY_REJECTION, PlayScript, SimulatedSurface};
