// src/replay.rs
//
// Replays recorded geolocation traces through real detection sessions.
// A trace is a JSON file of fixes with offsets relative to watch start;
// replay delivers them on schedule, so a session behaves exactly as it
// would against a live positioning source.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;
use walkdir::WalkDir;

use crate::positioning::TraceFix;
use crate::types::{Config, DetectionResult};

#[derive(Debug, Deserialize)]
pub struct Trace {
    #[serde(default)]
    pub name: Option<String>,
    pub fixes: Vec<TraceFix>,
}

impl Trace {
    pub fn label(&self, path: &Path) -> String {
        self.name.clone().unwrap_or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("trace")
                .to_string()
        })
    }
}

pub struct TraceReplayer {
    config: Config,
}

impl TraceReplayer {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn find_trace_files(&self) -> Result<Vec<PathBuf>> {
        let mut traces = Vec::new();

        for entry in WalkDir::new(&self.config.replay.input_dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                traces.push(path.to_path_buf());
            }
        }

        traces.sort();
        info!("Found {} trace files", traces.len());
        Ok(traces)
    }

    pub fn load_trace(&self, path: &Path) -> Result<Trace> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading trace {}", path.display()))?;
        let trace: Trace = serde_json::from_str(&contents)
            .with_context(|| format!("parsing trace {}", path.display()))?;
        Ok(trace)
    }

    /// Write one session's result next to the other outputs, named after
    /// the input trace.
    pub fn save_result(&self, input_path: &Path, result: &DetectionResult) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.replay.output_dir)?;

        let stem = input_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("trace");
        let output_path =
            PathBuf::from(&self.config.replay.output_dir).join(format!("{stem}_result.json"));

        let payload = serde_json::to_string_pretty(result)?;
        fs::write(&output_path, payload)
            .with_context(|| format!("writing {}", output_path.display()))?;
        Ok(output_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_parsing() {
        let payload = r#"{
            "name": "morning commute",
            "fixes": [
                {"offset_ms": 0, "lat": 52.2297, "lng": 21.0122, "accuracy_m": 8.0},
                {"offset_ms": 1000, "lat": 52.2299, "lng": 21.0122, "speed_mps": 12.5}
            ]
        }"#;

        let trace: Trace = serde_json::from_str(payload).unwrap();
        assert_eq!(trace.name.as_deref(), Some("morning commute"));
        assert_eq!(trace.fixes.len(), 2);
        assert_eq!(trace.fixes[0].accuracy_m, Some(8.0));
        assert!(trace.fixes[0].speed_mps.is_none());
        assert_eq!(trace.fixes[1].speed_mps, Some(12.5));
    }

    #[test]
    fn test_trace_label_falls_back_to_file_stem() {
        let trace: Trace = serde_json::from_str(r#"{"fixes": []}"#).unwrap();
        assert_eq!(trace.label(Path::new("/data/tram_17.json")), "tram_17");
    }
}
