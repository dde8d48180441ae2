//! CLI command implementations

use std::time::Duration;

use anyhow::{Context, bail};
use clap::Subcommand;
use undertow_core::config::UndertowConfig;
use undertow_core::magnet::{
    BtihValidator, InfoHash, MagnetNormalizer, MagnetValidator, PlaybackConfigDeriver,
    extract_web_seeds,
};
use undertow_core::playback::hosted_failure_details;
use undertow_core::{HttpProbe, UndertowError};
use undertow_sim::{Scenario, ScenarioReport, builtin_scenarios, scenario_by_name};

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run simulated playback scenarios
    Simulate {
        /// Scenario to run; runs every scenario when omitted
        scenario: Option<String>,
        /// List scenario names and exit
        #[arg(long)]
        list: bool,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check whether a hosted URL is reachable
    Probe {
        /// Hosted media URL
        url: String,
        /// Request timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
    },
    /// Inspect how a magnet link would be used for playback
    Magnet {
        /// Magnet link or bare info hash
        magnet: String,
        /// Hosted URL to add as a web seed
        #[arg(long, default_value = "")]
        url: String,
    },
}

/// Handle the CLI command
///
/// # Errors
/// Returns appropriate error based on the command that fails
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Simulate {
            scenario,
            list,
            json,
        } => simulate(scenario, list, json).await,
        Commands::Probe { url, timeout_ms } => probe(&url, timeout_ms).await,
        Commands::Magnet { magnet, url } => inspect_magnet(&magnet, &url),
    }
}

/// Run one or all built-in scenarios
///
/// # Errors
/// - Unknown scenario name
/// - Report serialization failure
pub async fn simulate(scenario: Option<String>, list: bool, json: bool) -> anyhow::Result<()> {
    if list {
        for scenario in builtin_scenarios() {
            println!("{:<24} {}", scenario.name, scenario.description);
        }
        return Ok(());
    }

    let scenarios: Vec<Scenario> = match scenario {
        Some(name) => vec![scenario_by_name(&name)?],
        None => builtin_scenarios(),
    };

    for scenario in scenarios {
        let report = scenario.run().await;
        if json {
            println!("{}", report.to_json().context("serializing scenario report")?);
        } else {
            print_report(&report);
        }
    }
    Ok(())
}

fn print_report(report: &ScenarioReport) {
    let outcome = match (&report.source, &report.error) {
        (Some(source), _) => format!("playing from {source}"),
        (None, Some(error)) => format!("failed: {error}"),
        (None, None) => "no result".to_string(),
    };
    println!("{} ({} ms): {outcome}", report.name, report.elapsed_ms);
    if !report.fallbacks.is_empty() {
        let reasons: Vec<&str> = report.fallbacks.iter().map(|r| r.as_str()).collect();
        println!("  fallbacks: {}", reasons.join(", "));
    }
    for status in &report.statuses {
        println!("  status: {status}");
    }
    println!(
        "  probes: {}, torrent starts: {}, engine cleanups: {}",
        report.probe_calls, report.launcher_calls, report.engine_cleanups
    );
}

/// Probe a hosted URL once
///
/// # Errors
/// - `UndertowError::Configuration` - An `UNDERTOW_*` override is invalid
/// - `UndertowError::Probe` - HTTP client could not be created
pub async fn probe(url: &str, timeout_ms: Option<u64>) -> anyhow::Result<()> {
    let mut config = UndertowConfig::try_from_env()?;
    if let Some(timeout) = timeout_ms {
        config.probe.request_timeout = Duration::from_millis(timeout);
    }
    let probe = HttpProbe::new(&config.probe).map_err(UndertowError::from)?;
    tracing::debug!(
        url,
        timeout_ms = config.probe.request_timeout.as_millis() as u64,
        "Probing hosted URL"
    );

    let result = probe.check(url).await;
    match result.status {
        Some(status) => println!("{url}: {:?} (HTTP {status})", result.outcome),
        None => println!("{url}: {:?}", result.outcome),
    }

    if result.outcome.allows_playback() {
        println!("Hosted playback would be attempted.");
    } else {
        let details = hosted_failure_details(&result);
        println!("{} [{:?}]", details.message, details.category);
    }
    Ok(())
}

/// Show the playback config derived from a magnet
///
/// # Errors
/// - Magnet has no usable BitTorrent v1 info hash
pub fn inspect_magnet(magnet: &str, url: &str) -> anyhow::Result<()> {
    let config = MagnetNormalizer::new().derive(magnet, url);
    if !config.provided {
        bail!("No magnet provided");
    }

    println!("Magnet:          {}", config.magnet);
    println!("Changed:         {}", config.did_mutate);
    if !config.fallback_magnet.is_empty() {
        println!("Fallback magnet: {}", config.fallback_magnet);
    }
    for seed in extract_web_seeds(&config.magnet) {
        println!("Web seed:        {seed}");
    }

    if !BtihValidator.is_valid(&config.magnet) {
        let message = UndertowConfig::default()
            .playback
            .unsupported_magnet_message;
        bail!(message);
    }
    match InfoHash::from_hex(&config.info_hash) {
        Ok(info_hash) => println!("Info hash:       {info_hash}"),
        // Base32 topics are valid but not hex
        Err(_) => println!("Info hash:       {} (base32)", config.info_hash),
    }
    Ok(())
}
