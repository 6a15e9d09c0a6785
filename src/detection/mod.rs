// src/detection/mod.rs
//
// Transport-mode detection pipeline.
//
// Signal flow:
//   Position fixes → collector (accuracy gate, window ticks) ──┐
//                                                              ├→ session → DetectionResult
//   Frozen samples → stationarity + estimator → classifier ────┘
//
// Orchestrated by session::DetectionSession.

pub mod classifier;
pub mod collector;
pub mod estimator;
pub mod session;
pub mod stationarity;

pub use classifier::{alternates_for, ModeClassifier};
pub use collector::{CollectorEvent, SampleCollector};
pub use estimator::SpeedEstimator;
pub use session::{DetectError, DetectionOutcome, DetectionSession, SessionState, StopHandle};
pub use stationarity::StationarityDetector;
