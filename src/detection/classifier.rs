// src/detection/classifier.rs
//
// Maps a scalar speed estimate to a transport mode, and proposes
// neighboring modes when the estimate sits near a band boundary.

use crate::types::{ClassifierConfig, TransportMode};

pub struct ModeClassifier {
    config: ClassifierConfig,
}

impl ModeClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Total over all real inputs. Non-positive or non-finite speed
    /// carries no signal and classifies as Unknown.
    pub fn classify(&self, speed_kmh: f64) -> TransportMode {
        if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
            return TransportMode::Unknown;
        }
        if speed_kmh < self.config.walk_max_kmh {
            TransportMode::Walk
        } else if speed_kmh < self.config.bike_max_kmh {
            TransportMode::Bike
        } else if speed_kmh < self.config.car_max_kmh {
            TransportMode::Car
        } else {
            TransportMode::Train
        }
    }
}

// Band edges in km/h for the alternates model. Each band brackets the
// speeds where the primary classification is most likely to be wrong.
const ALTERNATE_BANDS: [(f64, f64, [TransportMode; 2]); 4] = [
    (2.0, 10.0, [TransportMode::Walk, TransportMode::Bike]),
    (10.0, 40.0, [TransportMode::Bike, TransportMode::Car]),
    (40.0, 120.0, [TransportMode::Car, TransportMode::Train]),
    (120.0, f64::INFINITY, [TransportMode::Train, TransportMode::Car]),
];

/// Plausible neighboring modes for a speed estimate, de-duplicated with
/// first-occurrence order preserved. The caller is responsible for
/// removing the mode it already chose before display.
pub fn alternates_for(speed_kmh: f64) -> Vec<TransportMode> {
    let mut out = Vec::new();
    for (lo, hi, modes) in ALTERNATE_BANDS {
        if speed_kmh >= lo && speed_kmh < hi {
            for mode in modes {
                if !out.contains(&mode) {
                    out.push(mode);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use TransportMode::*;

    fn classifier() -> ModeClassifier {
        ModeClassifier::new(ClassifierConfig::default())
    }

    #[test]
    fn test_band_boundaries() {
        let cases = [
            (0.0, Unknown),
            (5.9, Walk),
            (6.0, Bike),
            (19.9, Bike),
            (20.0, Car),
            (89.9, Car),
            (90.0, Train),
            (1000.0, Train),
        ];
        let c = classifier();
        for (speed, expected) in cases {
            assert_eq!(c.classify(speed), expected, "speed {speed}");
        }
    }

    #[test]
    fn test_degenerate_inputs_are_unknown() {
        let c = classifier();
        assert_eq!(c.classify(-4.0), Unknown);
        assert_eq!(c.classify(f64::NAN), Unknown);
        assert_eq!(c.classify(f64::INFINITY), Unknown);
    }

    #[test]
    fn test_classifier_never_emits_tram() {
        let c = classifier();
        for speed in [0.5, 3.0, 15.0, 45.0, 130.0, 400.0] {
            assert_ne!(c.classify(speed), Tram);
        }
    }

    #[test]
    fn test_alternate_bands() {
        assert_eq!(alternates_for(0.5), vec![]);
        assert_eq!(alternates_for(2.0), vec![Walk, Bike]);
        assert_eq!(alternates_for(9.9), vec![Walk, Bike]);
        assert_eq!(alternates_for(10.0), vec![Bike, Car]);
        assert_eq!(alternates_for(39.9), vec![Bike, Car]);
        assert_eq!(alternates_for(40.0), vec![Car, Train]);
        assert_eq!(alternates_for(119.9), vec![Car, Train]);
        assert_eq!(alternates_for(120.0), vec![Train, Car]);
        assert_eq!(alternates_for(500.0), vec![Train, Car]);
    }

    #[test]
    fn test_alternates_empty_for_degenerate_speeds() {
        assert_eq!(alternates_for(0.0), vec![]);
        assert_eq!(alternates_for(-1.0), vec![]);
        assert_eq!(alternates_for(f64::NAN), vec![]);
    }
}
