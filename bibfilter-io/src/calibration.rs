//! Calibration map loading.
//!
//! A calibration file holds named 2D objects, each a set of theta bin
//! edges and a `[bin][layer]` table:
//!
//! ```json
//! { "objects": {
//!     "mean":   { "theta_edges": [0.0, 0.5, 1.5708],
//!                 "values": [[0.01, 0.02], [0.03, 0.04]] },
//!     "stddev": { "theta_edges": [0.0, 0.5, 1.5708],
//!                 "values": [[0.001, 0.002], [0.003, 0.004]] } } }
//! ```

use crate::Result;
use bibfilter_algorithms::{AngularBinning, CalibrationMap, CalibrationSource};
use bibfilter_core::Error as CoreError;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct CalibrationFile {
    objects: BTreeMap<String, CalibrationObject>,
}

#[derive(Debug, Deserialize)]
struct CalibrationObject {
    theta_edges: AngularBinning,
    values: Vec<Vec<f64>>,
}

fn missing(path: &Path, what: impl std::fmt::Display) -> CoreError {
    CoreError::MissingCalibration(format!("{}: {what}", path.display()))
}

fn read_file(path: &Path) -> std::result::Result<CalibrationFile, CoreError> {
    let file = File::open(path).map_err(|e| missing(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| missing(path, e))
}

/// Loads the mean and standard-deviation maps named by `source`.
///
/// Every failure is reported as [`CoreError::MissingCalibration`], which
/// aborts the run.
///
/// # Errors
/// Fails if the file cannot be read, either object is absent, the two
/// objects use different binning, or their shapes disagree.
pub fn load_calibration(source: &CalibrationSource) -> Result<CalibrationMap> {
    let path = source.path.as_path();
    let mut file = read_file(path)?;

    let mut take = |name: &str| {
        file.objects
            .remove(name)
            .ok_or_else(|| missing(path, format_args!("object '{name}' not found")))
    };
    let mean = take(&source.mean)?;
    let std_dev = take(&source.stddev)?;

    if mean.theta_edges != std_dev.theta_edges {
        return Err(missing(
            path,
            format_args!(
                "'{}' and '{}' use different theta binning",
                source.mean, source.stddev
            ),
        )
        .into());
    }

    let map = CalibrationMap::new(mean.theta_edges, &mean.values, &std_dev.values)?;
    log::info!(
        "loaded calibration {}: {} theta bins x {} layers",
        path.display(),
        map.binning().n_bins(),
        map.n_layers()
    );
    Ok(map)
}
