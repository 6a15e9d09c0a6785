use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub detection: DetectionConfig,
    pub nearby: NearbyConfig,
    pub replay: ReplayConfig,
    pub logging: LoggingConfig,
}

/// Everything one detection session needs: window timing plus the
/// per-stage thresholds. Each stage keeps its own sub-config so the
/// values can be tuned independently in config.yaml.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DetectionConfig {
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub collector: CollectorConfig,
    #[serde(default)]
    pub estimator: EstimatorConfig,
    #[serde(default)]
    pub stationarity: StationarityConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    pub window_seconds: f64,
    pub tick_millis: u64,
    pub hint_timeout_seconds: f64,
    pub hint_radius_m: f64,
    pub hint_categories: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window_seconds: 12.0,
            tick_millis: 500,
            hint_timeout_seconds: 3.0,
            hint_radius_m: 250.0,
            hint_categories: vec![
                "transit_station".to_string(),
                "train_station".to_string(),
                "bus_station".to_string(),
                "subway_station".to_string(),
                "light_rail_station".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorConfig {
    /// Fixes with an accuracy radius above this are dropped at ingestion.
    pub max_accuracy_m: f64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self { max_accuracy_m: 50.0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatorConfig {
    pub min_dt_s: f64,
    pub min_move_m: f64,
    pub max_speed_mps: f64,
    pub max_accuracy_m: f64,
    pub percentile: f64,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            min_dt_s: 1.0,
            min_move_m: 8.0,
            max_speed_mps: 40.0, // ~144 km/h
            max_accuracy_m: 50.0,
            percentile: 0.6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationarityConfig {
    pub min_samples: usize,
    pub max_radius_m: f64,
}

impl Default for StationarityConfig {
    fn default() -> Self {
        Self {
            min_samples: 3,
            max_radius_m: 25.0,
        }
    }
}

/// Speed bands in km/h, lower bound inclusive. Heuristic values, not
/// physical law; tune per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub walk_max_kmh: f64,
    pub bike_max_kmh: f64,
    pub car_max_kmh: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            walk_max_kmh: 6.0,
            bike_max_kmh: 20.0,
            car_max_kmh: 90.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NearbyConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Name of the environment variable holding the places API key.
    pub api_key_env: String,
    pub timeout_seconds: f64,
}

impl Default for NearbyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "https://maps.googleapis.com/maps/api/place".to_string(),
            api_key_env: "PLACES_API_KEY".to_string(),
            timeout_seconds: 3.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub input_dir: String,
    pub output_dir: String,
    pub save_results: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

/// One location observation. Immutable once recorded; the session's
/// sample sequence is append-only during collection and frozen for all
/// downstream computation once the window closes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp_ms: f64,
    pub lat: f64,
    pub lng: f64,
    pub accuracy_m: Option<f64>,
    /// Device-reported speed in m/s. Validated at the estimator, not here.
    pub speed_mps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    Walk,
    Bike,
    Car,
    Train,
    /// Only ever user-selected in the UI layer; the classifier never emits it.
    Tram,
    Unknown,
}

impl TransportMode {
    /// The modes the classifier can actually produce (besides Unknown).
    pub const DETECTABLE: [TransportMode; 4] = [
        TransportMode::Walk,
        TransportMode::Bike,
        TransportMode::Car,
        TransportMode::Train,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Walk => "walk",
            Self::Bike => "bike",
            Self::Car => "car",
            Self::Train => "train",
            Self::Tram => "tram",
            Self::Unknown => "unknown",
        }
    }
}

/// Final output of one detection session. Created exactly once per
/// completed or aborted session and never mutated afterwards.
#[derive(Debug, Clone, Serialize)]
pub struct DetectionResult {
    pub mode: TransportMode,
    pub speed_kmh: f64,
    pub samples: Vec<Sample>,
    pub nearby_hint: Option<String>,
    /// Ordered, de-duplicated, never contains `mode` itself.
    pub alternates: Vec<TransportMode>,
}

impl DetectionResult {
    /// Canonical fallback when detection could not produce a usable
    /// signal: unknown mode, zero speed, all detectable modes offered
    /// as alternates, no hint.
    pub fn unknown_fallback(samples: Vec<Sample>) -> Self {
        Self {
            mode: TransportMode::Unknown,
            speed_kmh: 0.0,
            samples,
            nearby_hint: None,
            alternates: TransportMode::DETECTABLE.to_vec(),
        }
    }
}
