// src/detection/estimator.rs
//
// Robust speed estimation over a frozen sample window. GPS traces are
// noisy and intermittent: single fixes jump, the device under-reports
// during brief signal loss, and reported speeds go missing entirely.
// The estimator pools every plausible instantaneous speed it can find
// and picks a percentile instead of trusting any one reading.

use std::cmp::Ordering;

use tracing::debug;

use crate::geo::haversine_meters;
use crate::types::{EstimatorConfig, Sample};

const MPS_TO_KMH: f64 = 3.6;

pub struct SpeedEstimator {
    config: EstimatorConfig,
}

impl SpeedEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        Self { config }
    }

    /// Estimate the window's speed in km/h. Always finite and >= 0;
    /// returns 0 when no candidate survives the gates.
    pub fn estimate_kmh(&self, samples: &[Sample]) -> f64 {
        let mut candidates = Vec::new();
        self.collect_reported(samples, &mut candidates);
        self.collect_derived(samples, &mut candidates);

        if candidates.is_empty() {
            return 0.0;
        }

        candidates.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));

        // Upper-middle percentile: biases above the median to compensate
        // for dead-time samples that under-report movement, while still
        // suppressing single bad fixes at the top.
        let idx = (self.config.percentile * (candidates.len() - 1) as f64).floor() as usize;
        let idx = idx.min(candidates.len() - 1);
        let speed_mps = candidates[idx];

        debug!(
            "speed estimate: {:.2} m/s from {} candidates",
            speed_mps,
            candidates.len()
        );

        speed_mps * MPS_TO_KMH
    }

    /// Source (a): device-reported speeds, taken as-is when finite,
    /// non-negative, and the fix itself is accurate enough.
    fn collect_reported(&self, samples: &[Sample], out: &mut Vec<f64>) {
        for s in samples {
            let Some(v) = s.speed_mps else { continue };
            if v.is_finite() && v >= 0.0 && s.accuracy_m.unwrap_or(0.0) <= self.config.max_accuracy_m
            {
                out.push(v);
            }
        }
    }

    /// Source (b): point-to-point speeds over consecutive pairs in
    /// collection order. A pair only counts when enough time passed,
    /// both endpoints are accurate enough, and the displacement clears
    /// the movement-noise floor (low-accuracy pairs need proportionally
    /// more displacement).
    fn collect_derived(&self, samples: &[Sample], out: &mut Vec<f64>) {
        for pair in samples.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);

            let dt = (b.timestamp_ms - a.timestamp_ms) / 1000.0;
            if dt < self.config.min_dt_s {
                continue;
            }

            let acc_a = a.accuracy_m.unwrap_or(0.0);
            let acc_b = b.accuracy_m.unwrap_or(0.0);
            if acc_a > self.config.max_accuracy_m || acc_b > self.config.max_accuracy_m {
                continue;
            }

            let dist = haversine_meters(a.lat, a.lng, b.lat, b.lng);
            let floor = self.config.min_move_m.max(acc_a).max(acc_b);
            if dist < floor {
                continue;
            }

            let v = dist / dt;
            if !v.is_finite() || v < 0.0 || v > self.config.max_speed_mps {
                continue;
            }
            out.push(v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(t_s: f64, lat: f64, lng: f64, acc: Option<f64>, speed: Option<f64>) -> Sample {
        Sample {
            timestamp_ms: t_s * 1000.0,
            lat,
            lng,
            accuracy_m: acc,
            speed_mps: speed,
        }
    }

    fn estimator() -> SpeedEstimator {
        SpeedEstimator::new(EstimatorConfig::default())
    }

    #[test]
    fn test_empty_and_single_sample_are_zero() {
        assert_eq!(estimator().estimate_kmh(&[]), 0.0);
        let one = sample(0.0, 52.0, 21.0, Some(5.0), None);
        assert_eq!(estimator().estimate_kmh(&[one]), 0.0);
    }

    #[test]
    fn test_estimate_is_non_negative() {
        // Out-of-order timestamps, bogus speeds, huge accuracy: nothing
        // here may push the estimate below zero.
        let samples = vec![
            sample(10.0, 52.0, 21.0, Some(90.0), Some(-3.0)),
            sample(4.0, 52.1, 21.1, None, Some(f64::NAN)),
            sample(5.0, 52.2, 21.2, Some(500.0), None),
        ];
        assert!(estimator().estimate_kmh(&samples) >= 0.0);
    }

    #[test]
    fn test_reported_speeds_alone_produce_estimate() {
        // Walking pace from the device, no usable positional deltas.
        let samples: Vec<Sample> = (0..10)
            .map(|i| sample(i as f64, 52.0, 21.0, Some(5.0), Some(1.1 + 0.02 * i as f64)))
            .collect();
        let kmh = estimator().estimate_kmh(&samples);
        assert!(kmh > 3.0 && kmh < 5.0, "got {kmh}");
    }

    #[test]
    fn test_reported_speed_rejected_when_fix_inaccurate() {
        let samples = vec![
            sample(0.0, 52.0, 21.0, Some(120.0), Some(10.0)),
            sample(1.0, 52.0, 21.0, Some(120.0), Some(10.0)),
        ];
        assert_eq!(estimator().estimate_kmh(&samples), 0.0);
    }

    #[test]
    fn test_implausible_jump_is_discarded() {
        // 500 m in 0.3 s is ~1667 m/s; the pair must not contribute,
        // and with nothing else available the estimate is zero.
        let samples = vec![
            sample(0.0, 52.0, 21.0, Some(5.0), None),
            sample(0.3, 52.0045, 21.0, Some(5.0), None),
        ];
        assert_eq!(estimator().estimate_kmh(&samples), 0.0);
    }

    #[test]
    fn test_fast_but_plausible_pair_is_discarded_above_cap() {
        // ~45 m/s over a full second still exceeds the 40 m/s cap.
        let samples = vec![
            sample(0.0, 52.0, 21.0, Some(5.0), None),
            sample(1.0, 52.000405, 21.0, Some(5.0), None),
        ];
        assert_eq!(estimator().estimate_kmh(&samples), 0.0);
    }

    #[test]
    fn test_sub_second_pairs_are_skipped() {
        // 20 m in 0.5 s would be a valid 40 m/s if dt were acceptable.
        let samples = vec![
            sample(0.0, 52.0, 21.0, Some(5.0), None),
            sample(0.5, 52.00018, 21.0, Some(5.0), None),
        ];
        assert_eq!(estimator().estimate_kmh(&samples), 0.0);
    }

    #[test]
    fn test_displacement_below_noise_floor_is_skipped() {
        // 6 m hops sit under the 8 m floor; GPS jitter, not travel.
        let samples = vec![
            sample(0.0, 52.0, 21.0, Some(5.0), None),
            sample(2.0, 52.000054, 21.0, Some(5.0), None),
            sample(4.0, 52.000108, 21.0, Some(5.0), None),
        ];
        assert_eq!(estimator().estimate_kmh(&samples), 0.0);
    }

    #[test]
    fn test_low_accuracy_raises_the_floor() {
        // 20 m hops clear the fixed 8 m floor but not a 30 m accuracy
        // radius on one endpoint.
        let samples = vec![
            sample(0.0, 52.0, 21.0, Some(30.0), None),
            sample(2.0, 52.00018, 21.0, Some(5.0), None),
        ];
        assert_eq!(estimator().estimate_kmh(&samples), 0.0);
    }

    #[test]
    fn test_driving_pace_from_positional_deltas() {
        // ~15 m/s northward, one fix per 2 s: every pair clears the
        // gates, so the estimate lands near 54 km/h.
        let samples: Vec<Sample> = (0..6)
            .map(|i| sample(2.0 * i as f64, 52.0 + 0.00027 * i as f64, 21.0, Some(5.0), None))
            .collect();
        let kmh = estimator().estimate_kmh(&samples);
        assert!(kmh > 45.0 && kmh < 65.0, "got {kmh}");
    }

    #[test]
    fn test_percentile_suppresses_single_outlier() {
        // Nine steady walking readings and one bad 30 m/s fix; the 60th
        // percentile must stay at walking pace.
        let mut samples: Vec<Sample> = (0..9)
            .map(|i| sample(i as f64, 52.0, 21.0, Some(5.0), Some(1.2)))
            .collect();
        samples.push(sample(9.0, 52.0, 21.0, Some(5.0), Some(30.0)));
        let kmh = estimator().estimate_kmh(&samples);
        assert!(kmh < 6.0, "got {kmh}");
    }
}
