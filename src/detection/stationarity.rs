// src/detection/stationarity.rs

use crate::geo::haversine_meters;
use crate::types::{Sample, StationarityConfig};

/// Decides whether a whole window represents negligible movement. A user
/// standing still shows GPS jitter bounded by a small radius around their
/// true position; real travel grows the envelope from the start point.
pub struct StationarityDetector {
    config: StationarityConfig,
}

impl StationarityDetector {
    pub fn new(config: StationarityConfig) -> Self {
        Self { config }
    }

    /// True when every sample stays within the radius of the *first*
    /// sample. Fewer than `min_samples` readings is insufficient
    /// evidence to claim the user has not moved.
    pub fn is_stationary(&self, samples: &[Sample]) -> bool {
        if samples.len() < self.config.min_samples {
            return false;
        }

        let first = &samples[0];
        let mut max_dist: f64 = 0.0;
        for s in samples {
            max_dist = max_dist.max(haversine_meters(first.lat, first.lng, s.lat, s.lng));
        }
        max_dist <= self.config.max_radius_m
    }
}
