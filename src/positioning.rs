// src/positioning.rs
//
// Contract for the host positioning subsystem. The engine never polls:
// the source pushes fixes and errors into a channel, and the collector
// consumes them alongside its own progress ticks.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::types::Sample;

/// Knobs forwarded to the positioning subsystem when a watch is opened.
#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub high_accuracy: bool,
    /// Maximum acceptable staleness of a cached fix.
    pub maximum_age: Duration,
    /// Subsystem-side timeout; expiry surfaces as a `Timeout` error event.
    pub timeout: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            maximum_age: Duration::ZERO,
            timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchId(pub u64);

/// One raw reading from the positioning subsystem.
#[derive(Debug, Clone, Copy)]
pub struct PositionFix {
    pub timestamp_ms: f64,
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
    pub speed_mps: Option<f64>,
}

impl PositionFix {
    /// Normalize into a sample: non-finite accuracy/speed readings are
    /// recorded as absent rather than carried through the pipeline.
    pub fn into_sample(self) -> Sample {
        Sample {
            timestamp_ms: self.timestamp_ms,
            lat: self.lat,
            lng: self.lng,
            accuracy_m: self.accuracy_m.filter(|a| a.is_finite()),
            speed_mps: self.speed_mps.filter(|s| s.is_finite()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionErrorKind {
    PermissionDenied,
    Unavailable,
    Timeout,
    Other,
}

impl PositionErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::Unavailable => "POSITION_UNAVAILABLE",
            Self::Timeout => "TIMEOUT",
            Self::Other => "OTHER",
        }
    }
}

/// Mid-watch failure pushed by the source (permission revoked, hardware
/// failure, subsystem timeout).
#[derive(Debug, Clone, Error)]
#[error("{} ({})", message, kind.as_str())]
pub struct PositionError {
    pub kind: PositionErrorKind,
    pub message: String,
}

impl PositionError {
    pub fn new(kind: PositionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Positioning is not supported on this host at all. Only ever surfaces
/// when opening a watch, never mid-collection.
#[derive(Debug, Clone, Error)]
#[error("positioning is not available: {reason}")]
pub struct CapabilityError {
    pub reason: String,
}

impl CapabilityError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum PositionEvent {
    Fix(PositionFix),
    Error(PositionError),
}

/// Push-model positioning source. Opening a watch may trigger the host's
/// location permission prompt; denial arrives as an `Error` event.
pub trait PositionSource {
    fn watch(
        &mut self,
        options: WatchOptions,
        events: mpsc::UnboundedSender<PositionEvent>,
    ) -> Result<WatchId, CapabilityError>;

    fn clear(&mut self, id: WatchId);
}

/// One scheduled fix inside a recorded trace, relative to watch start.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TraceFix {
    pub offset_ms: f64,
    pub lat: f64,
    pub lng: f64,
    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub speed_mps: Option<f64>,
}

/// Plays a recorded trace back on schedule. Each `watch` spawns a task
/// that sleeps between fixes and pushes them into the channel; `clear`
/// aborts the task. Doubles as the synthetic-injection seam in tests.
pub struct ReplayPositionSource {
    fixes: Vec<TraceFix>,
    task: Option<JoinHandle<()>>,
    next_id: u64,
}

impl ReplayPositionSource {
    pub fn new(fixes: Vec<TraceFix>) -> Self {
        Self {
            fixes,
            task: None,
            next_id: 1,
        }
    }
}

impl PositionSource for ReplayPositionSource {
    fn watch(
        &mut self,
        options: WatchOptions,
        events: mpsc::UnboundedSender<PositionEvent>,
    ) -> Result<WatchId, CapabilityError> {
        debug!(
            "replay watch opened (high_accuracy={}, maximum_age={}ms, timeout={}ms)",
            options.high_accuracy,
            options.maximum_age.as_millis(),
            options.timeout.as_millis()
        );

        let mut fixes = self.fixes.clone();
        fixes.sort_by(|a, b| a.offset_ms.total_cmp(&b.offset_ms));

        let base_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as f64;
        let start = tokio::time::Instant::now();

        let handle = tokio::spawn(async move {
            for fix in fixes {
                let at = start + Duration::from_secs_f64(fix.offset_ms.max(0.0) / 1000.0);
                tokio::time::sleep_until(at).await;
                let event = PositionEvent::Fix(PositionFix {
                    timestamp_ms: base_ms + fix.offset_ms,
                    lat: fix.lat,
                    lng: fix.lng,
                    accuracy_m: fix.accuracy_m,
                    speed_mps: fix.speed_mps,
                });
                if events.send(event).is_err() {
                    // Receiver gone; the watch was cleared underneath us.
                    return;
                }
            }
            debug!("replay trace exhausted");
        });

        self.task = Some(handle);
        let id = WatchId(self.next_id);
        self.next_id += 1;
        Ok(id)
    }

    fn clear(&mut self, _id: WatchId) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_labels() {
        let cases = [
            (PositionErrorKind::PermissionDenied, "PERMISSION_DENIED"),
            (PositionErrorKind::Unavailable, "POSITION_UNAVAILABLE"),
            (PositionErrorKind::Timeout, "TIMEOUT"),
            (PositionErrorKind::Other, "OTHER"),
        ];
        for (kind, label) in cases {
            assert_eq!(kind.as_str(), label);
            let err = PositionError::new(kind, "boom");
            assert!(err.to_string().contains(label));
        }
    }

    #[test]
    fn test_fix_normalizes_non_finite_readings() {
        let fix = PositionFix {
            timestamp_ms: 1_000.0,
            lat: 52.0,
            lng: 21.0,
            accuracy_m: Some(f64::INFINITY),
            speed_mps: Some(f64::NAN),
        };
        let sample = fix.into_sample();
        assert!(sample.accuracy_m.is_none());
        assert!(sample.speed_mps.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_replay_delivers_fixes_on_schedule() {
        let fixes = vec![
            TraceFix {
                offset_ms: 0.0,
                lat: 52.0,
                lng: 21.0,
                accuracy_m: Some(5.0),
                speed_mps: None,
            },
            TraceFix {
                offset_ms: 1_000.0,
                lat: 52.0001,
                lng: 21.0,
                accuracy_m: Some(5.0),
                speed_mps: None,
            },
        ];

        let mut source = ReplayPositionSource::new(fixes);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = source.watch(WatchOptions::default(), tx).unwrap();

        let first = rx.recv().await.expect("first fix");
        let second = rx.recv().await.expect("second fix");
        match (first, second) {
            (PositionEvent::Fix(a), PositionEvent::Fix(b)) => {
                assert!((b.timestamp_ms - a.timestamp_ms - 1_000.0).abs() < 1e-6);
                assert!(b.lat > a.lat);
            }
            other => panic!("expected fixes, got {other:?}"),
        }

        source.clear(id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_stops_delivery() {
        let fixes = vec![TraceFix {
            offset_ms: 5_000.0,
            lat: 52.0,
            lng: 21.0,
            accuracy_m: None,
            speed_mps: None,
        }];

        let mut source = ReplayPositionSource::new(fixes);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let id = source.watch(WatchOptions::default(), tx).unwrap();
        source.clear(id);

        // Task aborted: the channel closes without delivering the fix.
        assert!(rx.recv().await.is_none());
    }
}
