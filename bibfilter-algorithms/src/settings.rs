//! Filter settings shared by every registered filter.

use crate::classifier::ClassifierConfig;
use crate::time_selector::ArrivalWindow;
use crate::doublet::DoubletConfig;
use crate::threshold::ThresholdConfig;
use bibfilter_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Calibration file and the names of its mean/stddev objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSource {
    /// Calibration JSON file.
    pub path: PathBuf,
    /// Object holding per-bin means.
    #[serde(default = "default_mean_name")]
    pub mean: String,
    /// Object holding per-bin standard deviations.
    #[serde(default = "default_stddev_name")]
    pub stddev: String,
}

fn default_mean_name() -> String {
    "mean".to_string()
}

fn default_stddev_name() -> String {
    "stddev".to_string()
}

impl CalibrationSource {
    /// Source with the default object names.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            mean: default_mean_name(),
            stddev: default_stddev_name(),
        }
    }
}

/// Settings for one filtering run.
///
/// Collection names left unset fall back to each filter's defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Hit collection read by the filter.
    pub input_collection: Option<String>,
    /// Hit collection written by the filter.
    pub output_collection: Option<String>,
    /// Hit-to-truth relations to propagate; unset disables relation output.
    pub input_relations: Option<String>,
    /// Relation collection written next to the output hits.
    pub output_relations: Option<String>,
    /// Tracks whose hits the dedup filter removes.
    pub track_collection: Option<String>,
    /// MC particles defining the truth cones.
    pub particle_collection: Option<String>,
    /// Layer pairing for the doublet filter.
    pub doublet: DoubletConfig,
    /// Dynamic threshold options.
    pub threshold: ThresholdConfig,
    /// Per-hit decision options.
    pub classifier: ClassifierConfig,
    /// Gate for the standalone time selector.
    pub time_window: ArrivalWindow,
    /// Cone half-angle (rad) for the truth-cone filter.
    pub cone_width: Option<f64>,
    /// Calibration map; switches the threshold filter to calibration mode.
    pub calibration: Option<CalibrationSource>,
}

impl FilterSettings {
    /// Loads settings from a JSON file.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))?;
        serde_json::from_reader(BufReader::new(file))
            .map_err(|e| Error::ConfigError(format!("{}: {e}", path.display())))
    }

    /// Loads settings from a JSON string.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if the JSON is invalid.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Input collection name or `default`.
    #[must_use]
    pub fn input_or(&self, default: &str) -> String {
        self.input_collection
            .clone()
            .unwrap_or_else(|| default.to_string())
    }

    /// Output collection name or `default`.
    #[must_use]
    pub fn output_or(&self, default: &str) -> String {
        self.output_collection
            .clone()
            .unwrap_or_else(|| default.to_string())
    }

    /// Input/output relation names if relations are requested.
    #[must_use]
    pub fn relations_or(&self, default_output: &str) -> Option<(String, String)> {
        self.input_relations.as_ref().map(|input| {
            let output = self
                .output_relations
                .clone()
                .unwrap_or_else(|| default_output.to_string());
            (input.clone(), output)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "input_collection": "EcalEndcapCollectionRec",
            "threshold": {"n_sigma": 2.5},
            "classifier": {"subtract_baseline": true, "time_window": {"min": -0.25, "max": 10.0}},
            "calibration": {"path": "calib.json"}
        }"#;
        let settings = FilterSettings::from_json(json).unwrap();

        assert_eq!(settings.input_or("x"), "EcalEndcapCollectionRec");
        assert_eq!(settings.output_or("Sel"), "Sel");
        assert_relative_eq!(settings.threshold.n_sigma, 2.5);
        assert_eq!(settings.threshold.n_layers, 50);
        assert!(settings.classifier.subtract_baseline);
        assert!(settings.classifier.correct_energy);
        let window = settings.classifier.time_window.unwrap();
        assert_relative_eq!(window.max, 10.0);
        assert_relative_eq!(window.offset, 0.0);
        assert_relative_eq!(settings.time_window.offset, 0.2167);
        let calibration = settings.calibration.unwrap();
        assert_eq!(calibration.mean, "mean");
        assert_eq!(calibration.stddev, "stddev");
        assert_eq!(settings.doublet, DoubletConfig::default());
    }

    #[test]
    fn test_relations_or() {
        let mut settings = FilterSettings::default();
        assert_eq!(settings.relations_or("out"), None);
        settings.input_relations = Some("in".into());
        assert_eq!(
            settings.relations_or("out"),
            Some(("in".to_string(), "out".to_string()))
        );
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            FilterSettings::from_json("{\"threshold\": 3}"),
            Err(Error::ConfigError(_))
        ));
    }
}
