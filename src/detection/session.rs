// src/detection/session.rs
//
// Drives one detection attempt end to end: collect fixes for a bounded
// window, then estimate, classify and enrich over the frozen samples.
// A session always terminates with either an explicit abort error or a
// usable result, never with nothing.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::detection::classifier::{alternates_for, ModeClassifier};
use crate::detection::collector::{CollectorEvent, SampleCollector};
use crate::detection::estimator::SpeedEstimator;
use crate::detection::stationarity::StationarityDetector;
use crate::nearby::{NearbyLookup, NoopLookup};
use crate::positioning::{CapabilityError, PositionError, PositionSource, WatchOptions};
use crate::types::{DetectionConfig, DetectionResult, Sample, TransportMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Collecting,
    Finalizing,
    Completed,
    Aborted,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Collecting => "COLLECTING",
            Self::Finalizing => "FINALIZING",
            Self::Completed => "COMPLETED",
            Self::Aborted => "ABORTED",
        }
    }
}

/// Caller-visible detection failures. Everything else degrades into a
/// well-formed result instead of erroring.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("positioning capability unavailable: {0}")]
    CapabilityUnavailable(#[from] CapabilityError),
    #[error("positioning error: {0}")]
    Positioning(#[from] PositionError),
}

/// What a finished session hands back. `result` is always present; on
/// abort it is the canonical unknown fallback and `error` says why.
#[derive(Debug)]
pub struct DetectionOutcome {
    pub result: DetectionResult,
    pub error: Option<DetectError>,
    pub state: SessionState,
}

impl DetectionOutcome {
    pub fn is_aborted(&self) -> bool {
        self.state == SessionState::Aborted
    }
}

/// Requests a manual stop of a running session. Stopping finalizes over
/// whatever was collected so far.
pub struct StopHandle {
    tx: mpsc::Sender<()>,
}

impl StopHandle {
    pub fn stop(&self) {
        let _ = self.tx.try_send(());
    }
}

pub struct DetectionSession<S: PositionSource, N: NearbyLookup> {
    config: DetectionConfig,
    collector: SampleCollector<S>,
    estimator: SpeedEstimator,
    stationarity: StationarityDetector,
    classifier: ModeClassifier,
    nearby: Option<N>,
    state: SessionState,
    stop_rx: mpsc::Receiver<()>,
}

impl<S: PositionSource> DetectionSession<S, NoopLookup> {
    pub fn new(source: S, config: DetectionConfig) -> (Self, StopHandle) {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        let tick = Duration::from_millis(config.session.tick_millis);
        let collector = SampleCollector::new(source, config.collector.clone(), tick);
        let session = Self {
            estimator: SpeedEstimator::new(config.estimator.clone()),
            stationarity: StationarityDetector::new(config.stationarity.clone()),
            classifier: ModeClassifier::new(config.classifier.clone()),
            collector,
            config,
            nearby: None,
            state: SessionState::Idle,
            stop_rx,
        };
        (session, StopHandle { tx: stop_tx })
    }
}

impl<S: PositionSource, N: NearbyLookup> DetectionSession<S, N> {
    /// Attach a nearby-places lookup for result enrichment.
    pub fn with_nearby<M: NearbyLookup>(self, lookup: M) -> DetectionSession<S, M> {
        DetectionSession {
            config: self.config,
            collector: self.collector,
            estimator: self.estimator,
            stationarity: self.stationarity,
            classifier: self.classifier,
            nearby: Some(lookup),
            state: self.state,
            stop_rx: self.stop_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run the session to completion. Consumes the session: another
    /// detection attempt needs a fresh one.
    pub async fn detect(mut self) -> DetectionOutcome {
        let window = Duration::from_secs_f64(self.config.session.window_seconds);
        info!("detection session starting ({:.1}s window)", window.as_secs_f64());
        self.set_state(SessionState::Collecting);

        // Opening the watch is what triggers the platform's location
        // permission ask, once per session.
        if let Err(err) = self.collector.start(window, WatchOptions::default()) {
            self.set_state(SessionState::Aborted);
            warn!("✗ {}", err);
            return DetectionOutcome {
                result: DetectionResult::unknown_fallback(Vec::new()),
                error: Some(DetectError::CapabilityUnavailable(err)),
                state: self.state,
            };
        }

        let mut position_error: Option<PositionError> = None;
        let mut stop_handle_gone = false;

        // Fixes and ticks are independent producers; no arrival order is
        // assumed between them.
        loop {
            tokio::select! {
                event = self.collector.next_event() => match event {
                    CollectorEvent::Accepted | CollectorEvent::Rejected => {}
                    CollectorEvent::Tick { progress_percent } => {
                        debug!("collection progress: {}%", progress_percent);
                    }
                    CollectorEvent::WindowElapsed => break,
                    CollectorEvent::SourceError(err) => {
                        position_error = Some(err);
                        break;
                    }
                    CollectorEvent::Closed => {
                        debug!("position source stopped delivering; waiting out the window");
                    }
                    CollectorEvent::Inactive => break,
                },
                stop = self.stop_rx.recv(), if !stop_handle_gone => match stop {
                    Some(()) => {
                        info!("manual stop requested");
                        break;
                    }
                    None => stop_handle_gone = true,
                },
            }
        }

        // Subscription and timer are released together on every exit
        // path; a half-released collector leaks a live watch.
        self.collector.stop();
        let samples = self.collector.take_samples();

        if let Some(err) = position_error {
            self.set_state(SessionState::Aborted);
            warn!("✗ positioning failed mid-window: {}", err);
            return DetectionOutcome {
                result: DetectionResult::unknown_fallback(samples),
                error: Some(DetectError::Positioning(err)),
                state: self.state,
            };
        }

        self.set_state(SessionState::Finalizing);
        let accepted = samples.len();
        let rejected = self.collector.rejected_count();
        let result = self.finalize(samples).await;
        self.set_state(SessionState::Completed);
        info!(
            "✓ detection complete: mode={} speed={:.1} km/h ({} samples kept, {} rejected)",
            result.mode.as_str(),
            result.speed_kmh,
            accepted,
            rejected
        );

        DetectionOutcome {
            result,
            error: None,
            state: self.state,
        }
    }

    async fn finalize(&mut self, samples: Vec<Sample>) -> DetectionResult {
        if samples.len() < 2 {
            info!(
                "under-sampled window ({} of 2 required), returning unknown",
                samples.len()
            );
            return DetectionResult::unknown_fallback(samples);
        }

        let raw_kmh = self.estimator.estimate_kmh(&samples);
        let raw_mode = self.classifier.classify(raw_kmh);

        let (mode, speed_kmh) = if self.stationarity.is_stationary(&samples) {
            // A bounded jitter envelope outranks the numeric estimate:
            // someone standing still must never be reported as moving.
            debug!("stationary window overrides raw estimate of {:.1} km/h", raw_kmh);
            (TransportMode::Unknown, 0.0)
        } else {
            (raw_mode, raw_kmh)
        };

        let mut alternates = alternates_for(speed_kmh);
        alternates.retain(|m| *m != mode);

        let nearby_hint = self.resolve_hint(samples.last().copied()).await;

        DetectionResult {
            mode,
            speed_kmh,
            samples,
            nearby_hint,
            alternates,
        }
    }

    /// Best-effort enrichment near the last sample. Failure and timeout
    /// are swallowed; the result simply ships without a hint.
    async fn resolve_hint(&self, last: Option<Sample>) -> Option<String> {
        let lookup = self.nearby.as_ref()?;
        let sample = last?;
        let timeout = Duration::from_secs_f64(self.config.session.hint_timeout_seconds);
        let lookup_fut = lookup.find_nearby(
            sample.lat,
            sample.lng,
            self.config.session.hint_radius_m,
            &self.config.session.hint_categories,
        );
        match tokio::time::timeout(timeout, lookup_fut).await {
            Ok(hint) => hint,
            Err(_) => {
                warn!("nearby hint lookup timed out, continuing without it");
                None
            }
        }
    }

    fn set_state(&mut self, next: SessionState) {
        debug!("session state: {} → {}", self.state.as_str(), next.as_str());
        self.state = next;
    }
}
