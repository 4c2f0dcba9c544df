//! Dynamic energy thresholds per (layer, polar-angle bin).
//!
//! Background deposits in a calorimeter cell depend mostly on depth and
//! polar angle. The estimator summarises the energy distribution in each
//! (layer, theta bin) by its mean and standard deviation and derives
//!
//! - threshold = mean + N * stddev (or a flat override), and
//! - correction = mean, the average background to subtract.
//!
//! Statistics come either from the current event (self-calibrating mode,
//! rebuilt every event) or from a calibration map loaded once per run.

use bibfilter_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::sync::Arc;

/// Default theta bin edges in degrees.
const DEFAULT_THETA_EDGES_DEG: [f64; 13] = [
    0.0, 30.0, 40.0, 50.0, 60.0, 70.0, 90.0, 110.0, 120.0, 130.0, 140.0, 150.0, 180.0,
];

/// Ordered partition of the polar angle.
///
/// Value `v` falls in bin `i` iff `edges[i] <= v < edges[i + 1]`; the last
/// bin also contains its upper edge. Values outside the edges clamp to the
/// nearest bin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct AngularBinning {
    edges: Vec<f64>,
}

impl AngularBinning {
    /// Creates a binning from explicit edges.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] unless there are at least two finite,
    /// strictly increasing edges.
    pub fn new(edges: Vec<f64>) -> Result<Self> {
        if edges.len() < 2 {
            return Err(Error::ConfigError(
                "angular binning needs at least two edges".into(),
            ));
        }
        if edges.iter().any(|e| !e.is_finite()) {
            return Err(Error::ConfigError("angular bin edges must be finite".into()));
        }
        if edges.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::ConfigError(
                "angular bin edges must be strictly increasing".into(),
            ));
        }
        Ok(Self { edges })
    }

    /// Standard calorimeter binning over [0, pi].
    #[must_use]
    pub fn default_theta() -> Self {
        Self {
            edges: DEFAULT_THETA_EDGES_DEG
                .iter()
                .map(|deg| deg.to_radians())
                .collect(),
        }
    }

    /// Bin edges.
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Number of bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.edges.len() - 1
    }

    /// Bin containing `value`, clamped to the valid range.
    #[must_use]
    pub fn find_bin(&self, value: f64) -> usize {
        let last = self.n_bins() - 1;
        // Negated comparison also routes NaN to the first bin.
        if !(value >= self.edges[0]) {
            log::debug!("value {value} below first bin edge, clamping");
            return 0;
        }
        if value >= self.edges[last + 1] {
            if value > self.edges[last + 1] {
                log::debug!("value {value} above last bin edge, clamping");
            }
            return last;
        }
        self.edges.partition_point(|&e| e <= value) - 1
    }
}

impl Default for AngularBinning {
    fn default() -> Self {
        Self::default_theta()
    }
}

impl TryFrom<Vec<f64>> for AngularBinning {
    type Error = Error;

    fn try_from(edges: Vec<f64>) -> Result<Self> {
        Self::new(edges)
    }
}

impl From<AngularBinning> for Vec<f64> {
    fn from(binning: AngularBinning) -> Self {
        binning.edges
    }
}

/// Streaming mean and population standard deviation (Welford).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    /// Adds one sample.
    #[allow(clippy::cast_precision_loss)]
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    /// Number of samples.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Sample mean, 0 when empty.
    #[must_use]
    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population standard deviation, 0 when empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn std_dev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }
}

/// Threshold and baseline correction for one (layer, bin) cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BinThreshold {
    /// Energy a hit must exceed.
    pub threshold: f64,
    /// Baseline removed from accepted hits.
    pub correction: f64,
}

impl BinThreshold {
    fn from_stats(mean: f64, std_dev: f64, config: &ThresholdConfig) -> Self {
        let threshold = if config.flat_threshold > 0.0 {
            config.flat_threshold
        } else {
            mean + config.n_sigma * std_dev
        };
        Self {
            threshold,
            correction: mean,
        }
    }
}

/// Precomputed background mean and standard deviation per (theta bin, layer).
///
/// Maps are filled for theta in [0, pi/2]; queries above pi/2 are folded
/// onto `pi - theta` before binning.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMap {
    binning: AngularBinning,
    n_layers: usize,
    mean: Vec<f64>,
    std_dev: Vec<f64>,
}

impl CalibrationMap {
    /// Creates a map from `[bin][layer]` tables.
    ///
    /// # Errors
    /// Returns [`Error::MissingCalibration`] if the tables do not match the
    /// binning or each other.
    pub fn new(binning: AngularBinning, mean: &[Vec<f64>], std_dev: &[Vec<f64>]) -> Result<Self> {
        let n_bins = binning.n_bins();
        if mean.len() != n_bins || std_dev.len() != n_bins {
            return Err(Error::MissingCalibration(format!(
                "expected {n_bins} theta bins, got {} mean and {} stddev rows",
                mean.len(),
                std_dev.len()
            )));
        }
        let n_layers = mean.first().map_or(0, Vec::len);
        if n_layers == 0 {
            return Err(Error::MissingCalibration("calibration has no layers".into()));
        }
        if mean.iter().chain(std_dev).any(|row| row.len() != n_layers) {
            return Err(Error::MissingCalibration(
                "calibration rows differ in layer count".into(),
            ));
        }

        Ok(Self {
            binning,
            n_layers,
            mean: mean.concat(),
            std_dev: std_dev.concat(),
        })
    }

    /// Theta binning of the map.
    #[must_use]
    pub fn binning(&self) -> &AngularBinning {
        &self.binning
    }

    /// Number of layers covered.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    /// Background mean in (`bin`, `layer`).
    #[must_use]
    pub fn mean_at(&self, bin: usize, layer: usize) -> f64 {
        self.mean[bin * self.n_layers + layer]
    }

    /// Background standard deviation in (`bin`, `layer`).
    #[must_use]
    pub fn std_dev_at(&self, bin: usize, layer: usize) -> f64 {
        self.std_dev[bin * self.n_layers + layer]
    }
}

/// Folds theta onto [0, pi/2] using the forward/backward symmetry.
#[inline]
#[must_use]
pub fn fold_theta(theta: f64) -> f64 {
    if theta > FRAC_PI_2 {
        PI - theta
    } else {
        theta
    }
}

/// Lookup table of [`BinThreshold`] per (layer, theta bin).
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    binning: AngularBinning,
    n_layers: usize,
    fold: bool,
    cells: Vec<BinThreshold>,
}

impl ThresholdTable {
    fn empty(binning: AngularBinning, n_layers: usize, fold: bool) -> Self {
        let n_cells = n_layers * binning.n_bins();
        Self {
            binning,
            n_layers,
            fold,
            cells: vec![BinThreshold::default(); n_cells],
        }
    }

    /// Builds the run-constant table from a calibration map.
    #[must_use]
    pub fn from_calibration(map: &CalibrationMap, config: &ThresholdConfig) -> Self {
        let mut table = Self::empty(map.binning().clone(), map.n_layers(), true);
        for layer in 0..table.n_layers {
            for bin in 0..table.n_bins() {
                let cell = BinThreshold::from_stats(
                    map.mean_at(bin, layer),
                    map.std_dev_at(bin, layer),
                    config,
                );
                table.set(layer, bin, cell);
            }
        }
        table
    }

    /// Number of layers.
    #[must_use]
    pub fn n_layers(&self) -> usize {
        self.n_layers
    }

    /// Number of theta bins.
    #[must_use]
    pub fn n_bins(&self) -> usize {
        self.binning.n_bins()
    }

    /// Theta binning.
    #[must_use]
    pub fn binning(&self) -> &AngularBinning {
        &self.binning
    }

    /// Bin used for a hit at `theta`, after folding if the table is symmetric.
    #[must_use]
    pub fn bin_for(&self, theta: f64) -> usize {
        let theta = if self.fold { fold_theta(theta) } else { theta };
        self.binning.find_bin(theta)
    }

    /// Cell at (`layer`, `bin`).
    #[must_use]
    pub fn get(&self, layer: usize, bin: usize) -> Option<&BinThreshold> {
        if layer >= self.n_layers || bin >= self.n_bins() {
            return None;
        }
        self.cells.get(layer * self.n_bins() + bin)
    }

    /// Cell for a hit on `layer` at polar angle `theta`.
    ///
    /// # Errors
    /// Returns [`Error::LayerOutOfRange`] if the table has no such layer.
    pub fn lookup(&self, layer: i32, theta: f64) -> Result<BinThreshold> {
        let out_of_range = || Error::LayerOutOfRange {
            layer,
            n_layers: self.n_layers,
        };
        let layer_idx = usize::try_from(layer).map_err(|_| out_of_range())?;
        self.get(layer_idx, self.bin_for(theta))
            .copied()
            .ok_or_else(out_of_range)
    }

    fn set(&mut self, layer: usize, bin: usize, cell: BinThreshold) {
        let n_bins = self.n_bins();
        self.cells[layer * n_bins + bin] = cell;
    }
}

/// Estimator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// Sigma multiplier N.
    pub n_sigma: f64,
    /// Number of calorimeter layers (self-calibrating mode).
    pub n_layers: usize,
    /// Theta bin edges (rad, self-calibrating mode).
    pub theta_edges: AngularBinning,
    /// Uniform threshold override (GeV); disabled when not positive.
    pub flat_threshold: f64,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            n_sigma: 3.0,
            n_layers: 50,
            theta_edges: AngularBinning::default_theta(),
            flat_threshold: 0.0,
        }
    }
}

impl ThresholdConfig {
    /// Sets the sigma multiplier.
    #[must_use]
    pub fn with_n_sigma(mut self, n_sigma: f64) -> Self {
        self.n_sigma = n_sigma;
        self
    }

    /// Sets the number of layers.
    #[must_use]
    pub fn with_n_layers(mut self, n_layers: usize) -> Self {
        self.n_layers = n_layers;
        self
    }

    /// Sets the theta binning.
    #[must_use]
    pub fn with_theta_edges(mut self, binning: AngularBinning) -> Self {
        self.theta_edges = binning;
        self
    }

    /// Sets the flat threshold override.
    #[must_use]
    pub fn with_flat_threshold(mut self, threshold: f64) -> Self {
        self.flat_threshold = threshold;
        self
    }
}

/// Where the per-bin statistics come from.
#[derive(Debug, Clone)]
enum Mode {
    /// Rebuilt from the hits of every event.
    SelfCalibrating {
        stats: Vec<RunningStats>,
        table: ThresholdTable,
    },
    /// Built once from a run-constant calibration map.
    Calibrated(Arc<ThresholdTable>),
}

/// Produces the [`ThresholdTable`] for each event.
#[derive(Debug, Clone)]
pub struct ThresholdEstimator {
    config: ThresholdConfig,
    mode: Mode,
}

impl ThresholdEstimator {
    /// Estimator learning thresholds from each event's own hits.
    #[must_use]
    pub fn self_calibrating(config: ThresholdConfig) -> Self {
        let table = ThresholdTable::empty(config.theta_edges.clone(), config.n_layers, false);
        let stats = vec![RunningStats::default(); table.cells.len()];
        Self {
            config,
            mode: Mode::SelfCalibrating { stats, table },
        }
    }

    /// Estimator using a calibration map loaded at start of run.
    #[must_use]
    pub fn from_calibration(config: ThresholdConfig, map: &CalibrationMap) -> Self {
        let table = ThresholdTable::from_calibration(map, &config);
        Self::with_table(config, Arc::new(table))
    }

    /// Estimator sharing an already built run-constant table.
    #[must_use]
    pub fn with_table(config: ThresholdConfig, table: Arc<ThresholdTable>) -> Self {
        Self {
            config,
            mode: Mode::Calibrated(table),
        }
    }

    /// Configuration in use.
    #[must_use]
    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    /// Returns true when thresholds are learned per event.
    #[must_use]
    pub fn is_self_calibrating(&self) -> bool {
        matches!(self.mode, Mode::SelfCalibrating { .. })
    }

    /// Returns the table for an event.
    ///
    /// `energies`, `thetas` and `layers` describe the event's hits. In
    /// calibration-map mode they are ignored. Hits on layers outside the
    /// table are left out of the statistics.
    pub fn estimate(
        &mut self,
        energies: &[f64],
        thetas: &[f64],
        layers: &[i32],
    ) -> &ThresholdTable {
        match &mut self.mode {
            Mode::Calibrated(table) => &**table,
            Mode::SelfCalibrating { stats, table } => {
                stats.fill(RunningStats::default());
                let n_bins = table.n_bins();

                for ((&energy, &theta), &layer) in energies.iter().zip(thetas).zip(layers) {
                    match usize::try_from(layer) {
                        Ok(l) if l < table.n_layers => {
                            let bin = table.binning.find_bin(theta);
                            stats[l * n_bins + bin].push(energy);
                        }
                        _ => log::warn!(
                            "hit on layer {layer} outside {} configured layers",
                            table.n_layers
                        ),
                    }
                }

                for (cell, s) in table.cells.iter_mut().zip(stats.iter()) {
                    *cell = BinThreshold::from_stats(s.mean(), s.std_dev(), &self.config);
                }
                &*table
            }
        }
    }
}
