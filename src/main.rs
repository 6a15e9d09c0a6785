// src/main.rs

mod config;
mod detection;
mod geo;
mod nearby;
mod positioning;
mod replay;
mod types;

use anyhow::Result;
use detection::{DetectionOutcome, DetectionSession};
use nearby::PlacesClient;
use positioning::ReplayPositionSource;
use replay::TraceReplayer;
use std::path::Path;
use tracing::{error, info, warn};
use types::Config;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load("config.yaml")?;

    tracing_subscriber::fmt()
        .with_env_filter(format!("transport_detection={}", config.logging.level))
        .init();

    info!("🧭 Transport Detection Replay Starting");
    info!("✓ Configuration loaded");
    info!(
        "Detection window: {:.1}s, accuracy gate: {:.0}m, speed cap: {:.0} m/s",
        config.detection.session.window_seconds,
        config.detection.collector.max_accuracy_m,
        config.detection.estimator.max_speed_mps
    );

    let replayer = TraceReplayer::new(config.clone());
    let trace_files = replayer.find_trace_files()?;

    if trace_files.is_empty() {
        error!("No trace files found in {}", config.replay.input_dir);
        return Ok(());
    }

    let nearby = PlacesClient::from_config(&config.nearby)?;
    if nearby.is_some() {
        info!("✓ Nearby-places lookup enabled");
    }

    let mut completed = 0usize;
    let mut aborted = 0usize;

    for (idx, trace_path) in trace_files.iter().enumerate() {
        info!("========================================");
        info!(
            "Replaying trace {}/{}: {}",
            idx + 1,
            trace_files.len(),
            trace_path.display()
        );

        match run_trace(&replayer, &config, nearby.clone(), trace_path).await {
            Ok(outcome) => {
                if outcome.is_aborted() {
                    aborted += 1;
                    warn!(
                        "Trace aborted: {}",
                        outcome
                            .error
                            .as_ref()
                            .map(|e| e.to_string())
                            .unwrap_or_default()
                    );
                } else {
                    completed += 1;
                    info!(
                        "Result: mode={} speed={:.1} km/h alternates=[{}]{}",
                        outcome.result.mode.as_str(),
                        outcome.result.speed_kmh,
                        outcome
                            .result
                            .alternates
                            .iter()
                            .map(|m| m.as_str())
                            .collect::<Vec<_>>()
                            .join(", "),
                        outcome
                            .result
                            .nearby_hint
                            .as_deref()
                            .map(|h| format!(" hint=\"{h}\""))
                            .unwrap_or_default()
                    );
                }
            }
            Err(e) => {
                error!("Failed to replay {}: {:#}", trace_path.display(), e);
            }
        }
    }

    info!("========================================");
    info!(
        "✓ Replay finished: {} completed, {} aborted, {} total",
        completed,
        aborted,
        trace_files.len()
    );

    Ok(())
}

async fn run_trace(
    replayer: &TraceReplayer,
    config: &Config,
    nearby: Option<PlacesClient>,
    trace_path: &Path,
) -> Result<DetectionOutcome> {
    let trace = replayer.load_trace(trace_path)?;
    info!(
        "Trace \"{}\": {} recorded fixes",
        trace.label(trace_path),
        trace.fixes.len()
    );

    let source = ReplayPositionSource::new(trace.fixes);
    let (session, _stop) = DetectionSession::new(source, config.detection.clone());

    let outcome = match nearby {
        Some(client) => session.with_nearby(client).detect().await,
        None => session.detect().await,
    };

    if config.replay.save_results && !outcome.is_aborted() {
        let path = replayer.save_result(trace_path, &outcome.result)?;
        info!("Saved result to {}", path.display());
    }

    Ok(outcome)
}
